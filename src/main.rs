mod app;
mod ui;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, MouseEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use app::{App, View};
use threadlist::config::Config;
use threadlist::mail::RecordSource;
use threadlist::projection::{GroupingMode, SortDirection};
use ui::{render_help, render_loading, render_projection};

#[derive(Parser)]
#[command(name = "threadlist", about = "Grouped, threaded mail list viewer")]
struct Cli {
    /// Maildir folder or tree to scan
    #[arg(long)]
    maildir: Option<PathBuf>,

    /// JSON array of records to load instead of a maildir
    #[arg(long, conflicts_with = "maildir")]
    records: Option<PathBuf>,

    /// Initial grouping mode
    #[arg(long, value_enum)]
    group_by: Option<GroupBy>,

    /// Initial sort direction
    #[arg(long, value_enum)]
    order: Option<Order>,

    /// Config file (defaults to <config_dir>/threadlist/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupBy {
    Date,
    Correspondent,
}

#[derive(Clone, Copy, ValueEnum)]
enum Order {
    Asc,
    Desc,
}

impl From<GroupBy> for GroupingMode {
    fn from(value: GroupBy) -> Self {
        match value {
            GroupBy::Date => GroupingMode::Date,
            GroupBy::Correspondent => GroupingMode::Correspondent,
        }
    }
}

impl From<Order> for SortDirection {
    fn from(value: Order) -> Self {
        match value {
            Order::Asc => SortDirection::Ascending,
            Order::Desc => SortDirection::Descending,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    if let Some(mode) = cli.group_by {
        config.view.grouping = mode.into();
    }
    if let Some(order) = cli.order {
        config.view.direction = order.into();
    }
    let source = resolve_source(&cli, &config)?;
    info!(source = %source.describe(), "starting");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config, source);
    app.start_load();
    let result = run(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

/// Command-line paths win over the config file; `records` wins over
/// `maildir` within each.
fn resolve_source(cli: &Cli, config: &Config) -> Result<RecordSource> {
    let user_email = config.source.user_email.clone();
    if let Some(path) = &cli.records {
        return Ok(RecordSource::Json(path.clone()));
    }
    if let Some(root) = &cli.maildir {
        return Ok(RecordSource::Maildir {
            root: root.clone(),
            user_email,
        });
    }
    if let Some(path) = config.source.records_path() {
        return Ok(RecordSource::Json(path));
    }
    match config.source.maildir_path() {
        Some(root) => Ok(RecordSource::Maildir { root, user_email }),
        None => bail!("no record source: pass --maildir or --records, or set one in the config"),
    }
}

fn init_logging() -> Result<()> {
    let dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("threadlist");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join("threadlist.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("threadlist=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| render(app, f))?;

        app.poll_load();

        // Poll with timeout so we redraw on resize and pick up loader progress
        if !event::poll(Duration::from_millis(100))? {
            app.refresh_day();
            continue;
        }

        match event::read()? {
            Event::Key(key) => {
                app.clear_status();
                match app.view {
                    View::List => match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
                        KeyCode::Char('j') | KeyCode::Down => app.next(),
                        KeyCode::Char('k') | KeyCode::Up => app.previous(),
                        KeyCode::PageDown => app.scroll_list_down(app.list_visible_height()),
                        KeyCode::PageUp => app.scroll_list_up(app.list_visible_height()),
                        KeyCode::Enter | KeyCode::Char(' ') => app.toggle_expansion(),
                        KeyCode::Char('u') => app.toggle_read(),
                        KeyCode::Char('x') => app.toggle_selection(),
                        KeyCode::Char('g') => app.cycle_grouping(),
                        KeyCode::Char('o') => app.flip_direction(),
                        KeyCode::Char('d') => app.remove_current(),
                        KeyCode::Char('R') => {
                            if !app.is_loading() {
                                app.start_load();
                            }
                        }
                        _ => {}
                    },
                    View::Loading => {
                        if key.code == KeyCode::Char('q') {
                            app.should_quit = true;
                        }
                    }
                }
            }
            Event::Mouse(mouse) if app.view == View::List => match mouse.kind {
                MouseEventKind::Down(_) => {
                    app.handle_click(mouse.column, mouse.row);
                }
                MouseEventKind::ScrollDown => app.scroll_list_down(3),
                MouseEventKind::ScrollUp => app.scroll_list_up(3),
                _ => {}
            },
            Event::Resize(_, _) => {
                // Terminal resized - just redraw on next loop iteration
            }
            _ => {}
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn render(app: &mut App, f: &mut Frame) {
    let area = f.area();

    // Split into main area and help bar
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    match app.view {
        View::List => {
            app.list_area = chunks[0];
            let title = format!(" {} ", app.source.describe());
            render_projection(
                f,
                chunks[0],
                &app.engine,
                &mut app.list_state,
                &title,
                &app.config.layout,
                &app.config.theme,
            );
        }
        View::Loading => {
            let (done, total) = app.progress.get();
            let message = format!("Reading {}", app.source.describe());
            render_loading(f, chunks[0], done, total, &message, &app.config.theme);
        }
    }

    render_help(
        f,
        chunks[1],
        app.view,
        &app.engine,
        app.status_message.as_deref(),
        &app.config.theme,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config_source() {
        let config = Config::parse("[source]\nrecords = \"/tmp/from-config.json\"").unwrap();

        let cli = Cli::parse_from(["threadlist", "--maildir", "/tmp/Mail"]);
        assert_eq!(
            resolve_source(&cli, &config).unwrap(),
            RecordSource::Maildir {
                root: PathBuf::from("/tmp/Mail"),
                user_email: None,
            }
        );

        let cli = Cli::parse_from(["threadlist"]);
        assert_eq!(
            resolve_source(&cli, &config).unwrap(),
            RecordSource::Json(PathBuf::from("/tmp/from-config.json"))
        );
    }

    #[test]
    fn test_cli_value_enums() {
        let cli = Cli::parse_from(["threadlist", "--group-by", "correspondent", "--order", "asc"]);
        assert_eq!(
            cli.group_by.map(GroupingMode::from),
            Some(GroupingMode::Correspondent)
        );
        assert_eq!(cli.order.map(SortDirection::from), Some(SortDirection::Ascending));
        assert!(Cli::try_parse_from(["threadlist", "--maildir", "a", "--records", "b"]).is_err());
    }
}
