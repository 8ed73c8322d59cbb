use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph},
};

use threadlist::config::ThemeConfig;

/// Render a loading screen with progress bar
pub fn render_loading(
    f: &mut Frame,
    area: Rect,
    current: usize,
    total: usize,
    message: &str,
    theme: &ThemeConfig,
) {
    // Fill background
    let bg_block = Block::default().style(Style::default().bg(theme.bg()));
    f.render_widget(bg_block, area);

    let modal_area = centered(area, 50, 7);
    f.render_widget(Clear, modal_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border_active()))
        .title(" Loading ")
        .title_alignment(Alignment::Center)
        .title_style(Style::default().fg(theme.primary()))
        .style(Style::default().bg(theme.bg_panel()));
    let inner_area = block.inner(modal_area);
    f.render_widget(block, modal_area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // message
            Constraint::Length(1), // spacing
            Constraint::Length(1), // progress bar
            Constraint::Length(1), // count
        ])
        .split(inner_area);

    let msg = Paragraph::new(Line::from(Span::styled(
        message,
        Style::default().fg(theme.fg()),
    )))
    .alignment(Alignment::Center);
    f.render_widget(msg, chunks[0]);

    let gauge = Gauge::default()
        .ratio(ratio(current, total))
        .gauge_style(Style::default().fg(theme.primary()).bg(theme.bg_panel()))
        .use_unicode(true);
    f.render_widget(gauge, chunks[2]);

    let count_text = if total > 0 {
        format!("{} / {} messages", current, total)
    } else {
        "Scanning...".to_string()
    };
    let count = Paragraph::new(Line::from(Span::styled(
        count_text,
        Style::default().fg(theme.fg_muted()),
    )))
    .alignment(Alignment::Center);
    f.render_widget(count, chunks[3]);
}

/// Box of at most `width` x `height` centered in `area`, keeping a two-cell
/// margin on small terminals.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width, height)
}

fn ratio(current: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (current as f64 / total as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(50, 200), 0.25);
        assert_eq!(ratio(9, 3), 1.0);
    }

    #[test]
    fn test_centered() {
        assert_eq!(centered(Rect::new(0, 0, 100, 40), 50, 7), Rect::new(25, 16, 50, 7));
        assert_eq!(centered(Rect::new(10, 5, 20, 6), 50, 7), Rect::new(12, 7, 16, 2));
    }
}
