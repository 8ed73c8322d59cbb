use chrono::{FixedOffset, Local, Offset};
use ratatui::style::Color;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::projection::{GroupKeyStrategy, GroupingMode, SortDirection};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub view: ViewConfig,
    pub layout: LayoutConfig,
    pub theme: ThemeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Maildir folder or tree to scan
    pub maildir: Option<String>,
    /// JSON array of records, used instead of the maildir when set
    pub records: Option<String>,
    /// Your address; mail from it is grouped under the recipient
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub grouping: GroupingMode,
    pub direction: SortDirection,
    /// Offset used to bucket records into days (defaults to the local one)
    pub utc_offset_minutes: Option<i32>,
    /// Check every projection invariant after each change (defaults to on in
    /// debug builds)
    pub verify_invariants: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Date column width in characters
    pub date_width: usize,
    /// Correspondent column width in characters
    pub from_width: usize,
    /// Indentation of expanded thread children
    pub child_indent: usize,
}

/// Semantic theme configuration using Capstan Cloud colors as defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub bg: String,
    pub bg_panel: String,
    pub fg: String,
    pub fg_muted: String,
    pub fg_subtle: String,

    pub border: String,
    pub border_active: String,

    pub primary: String,
    pub secondary: String,
    pub warning: String,

    pub selected_bg: String,
    pub unread: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            maildir: Some("~/Mail".to_string()),
            records: None,
            user_email: None,
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            grouping: GroupingMode::Date,
            direction: SortDirection::Descending,
            utc_offset_minutes: None,
            verify_invariants: None,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            date_width: 12,
            from_width: 20,
            child_indent: 4,
        }
    }
}

/// Capstan Cloud theme - warm earth tones with gold accents
impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            bg: "#1a1917".to_string(),
            bg_panel: "#262422".to_string(),
            fg: "#f7f7f5".to_string(),
            fg_muted: "#8c8985".to_string(),
            fg_subtle: "#b8b5b0".to_string(),

            border: "#524f4c".to_string(),
            border_active: "#d4a366".to_string(), // primary

            primary: "#d4a366".to_string(),
            secondary: "#8fa5ae".to_string(), // blue
            warning: "#faad14".to_string(),

            selected_bg: "#393634".to_string(),
            unread: "#d4a366".to_string(), // primary (gold)
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("threadlist/config.toml"))
            .unwrap_or_else(|| PathBuf::from(shellexpand::tilde("~/.config/threadlist/config.toml").into_owned()))
    }

    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    /// Reads `path`, falling back to defaults when it is missing or broken.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => return config,
                Err(e) => warn!(path = %path.display(), error = %e, "config parse error"),
            },
            Err(e) => warn!(path = %path.display(), error = %e, "config read error"),
        }
        Self::default()
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

impl SourceConfig {
    pub fn maildir_path(&self) -> Option<PathBuf> {
        self.maildir.as_deref().map(expand)
    }

    pub fn records_path(&self) -> Option<PathBuf> {
        self.records.as_deref().map(expand)
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

impl ViewConfig {
    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes.saturating_mul(60)))
            .unwrap_or_else(|| Local::now().offset().fix())
    }

    pub fn verify(&self) -> bool {
        self.verify_invariants.unwrap_or(cfg!(debug_assertions))
    }

    /// Grouping strategy for the configured mode, anchored at today's date
    /// in the configured offset.
    pub fn grouping_strategy(&self) -> GroupKeyStrategy {
        let offset = self.offset();
        let today = chrono::Utc::now().with_timezone(&offset).date_naive();
        GroupKeyStrategy::new(self.grouping, offset, today)
    }
}

impl ThemeConfig {
    pub fn bg(&self) -> Color {
        parse_color(&self.bg)
    }
    pub fn bg_panel(&self) -> Color {
        parse_color(&self.bg_panel)
    }
    pub fn fg(&self) -> Color {
        parse_color(&self.fg)
    }
    pub fn fg_muted(&self) -> Color {
        parse_color(&self.fg_muted)
    }
    pub fn fg_subtle(&self) -> Color {
        parse_color(&self.fg_subtle)
    }
    pub fn border(&self) -> Color {
        parse_color(&self.border)
    }
    pub fn border_active(&self) -> Color {
        parse_color(&self.border_active)
    }
    pub fn primary(&self) -> Color {
        parse_color(&self.primary)
    }
    pub fn secondary(&self) -> Color {
        parse_color(&self.secondary)
    }
    pub fn warning(&self) -> Color {
        parse_color(&self.warning)
    }
    pub fn selected_bg(&self) -> Color {
        parse_color(&self.selected_bg)
    }
    pub fn unread(&self) -> Color {
        parse_color(&self.unread)
    }
}

/// Parse color string to ratatui Color
pub fn parse_color(s: &str) -> Color {
    // Try hex first (#RRGGBB)
    if s.starts_with('#') && s.len() == 7 {
        if let (Ok(r), Ok(g), Ok(b)) = (
            u8::from_str_radix(&s[1..3], 16),
            u8::from_str_radix(&s[3..5], 16),
            u8::from_str_radix(&s[5..7], 16),
        ) {
            return Color::Rgb(r, g, b);
        }
    }

    match s.to_lowercase().as_str() {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "gray" | "grey" => Color::Gray,
        "darkgray" | "darkgrey" => Color::DarkGray,
        "lightred" => Color::LightRed,
        "lightgreen" => Color::LightGreen,
        "lightyellow" => Color::LightYellow,
        "lightblue" => Color::LightBlue,
        "lightmagenta" => Color::LightMagenta,
        "lightcyan" => Color::LightCyan,
        _ => Color::White,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = Config::parse(
            r#"
            [source]
            records = "/tmp/records.json"

            [view]
            grouping = "correspondent"
            utc_offset_minutes = -300
            verify_invariants = true

            [theme]
            primary = "cyan"
            "#,
        )
        .unwrap();

        assert_eq!(config.source.records_path(), Some(PathBuf::from("/tmp/records.json")));
        assert_eq!(config.source.maildir.as_deref(), Some("~/Mail"));
        assert_eq!(config.view.grouping, GroupingMode::Correspondent);
        assert_eq!(config.view.direction, SortDirection::Descending);
        assert_eq!(config.view.offset(), FixedOffset::west_opt(5 * 3600).unwrap());
        assert!(config.view.verify());
        assert_eq!(config.layout.date_width, 12);
        assert_eq!(config.theme.primary(), Color::Cyan);
        assert_eq!(config.theme.unread(), Color::Rgb(0xd4, 0xa3, 0x66));
    }

    #[test]
    fn test_bad_config_is_rejected() {
        assert!(Config::parse("[view]\ngrouping = \"weekday\"").is_err());
    }

    #[test]
    fn test_missing_or_broken_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Config::load_from(&dir.path().join("none.toml"));
        assert_eq!(missing.view.grouping, GroupingMode::Date);

        let broken = dir.path().join("config.toml");
        std::fs::write(&broken, "[view\n").unwrap();
        assert_eq!(Config::load_from(&broken).layout.from_width, 20);
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#102030"), Color::Rgb(0x10, 0x20, 0x30));
        assert_eq!(parse_color("DarkGrey"), Color::DarkGray);
        assert_eq!(parse_color("#zz0000"), Color::White);
    }
}
