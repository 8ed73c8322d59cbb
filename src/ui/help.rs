use ratatui::{
    Frame,
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
};

use crate::app::View;
use threadlist::config::ThemeConfig;
use threadlist::projection::ProjectionEngine;

pub fn render_help(
    f: &mut Frame,
    area: Rect,
    view: View,
    engine: &ProjectionEngine,
    status: Option<&str>,
    theme: &ThemeConfig,
) {
    let key_style = Style::default().fg(theme.primary());
    let text_style = Style::default().fg(theme.fg_subtle());
    let muted_style = Style::default().fg(theme.fg_muted());

    let mut spans = match view {
        View::List => vec![
            Span::styled("j/k", key_style),
            Span::styled(" nav  ", text_style),
            Span::styled("Enter", key_style),
            Span::styled(" thread  ", text_style),
            Span::styled("u", key_style),
            Span::styled(" read  ", text_style),
            Span::styled("x", key_style),
            Span::styled(" select  ", text_style),
            Span::styled("g", key_style),
            Span::styled(" group  ", text_style),
            Span::styled("o", key_style),
            Span::styled(" order  ", text_style),
            Span::styled("d", key_style),
            Span::styled(" remove  ", text_style),
            Span::styled("R", key_style),
            Span::styled(" reload  ", text_style),
            Span::styled("q", key_style),
            Span::styled(" quit", text_style),
        ],
        View::Loading => vec![Span::styled("Loading...", text_style)],
    };

    spans.push(Span::styled("  │  ", Style::default().fg(theme.border())));
    spans.push(Span::styled(summary(engine), muted_style));

    // Add status message if present
    if let Some(msg) = status {
        spans.push(Span::styled("  │  ", Style::default().fg(theme.border())));
        spans.push(Span::styled(msg, Style::default().fg(theme.secondary())));
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(theme.bg_panel()));

    f.render_widget(paragraph, area);
}

fn summary(engine: &ProjectionEngine) -> String {
    let mut text = format!(
        "{} msgs, {} unread, by {} {}",
        engine.total_count(),
        engine.total_unread_count(),
        engine.mode().name(),
        engine.direction().name(),
    );
    let selected = engine.selected_count();
    if selected > 0 {
        text.push_str(&format!(", {} selected", selected));
    }
    text
}
