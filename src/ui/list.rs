use chrono::{DateTime, FixedOffset, Utc};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
};

use threadlist::config::{LayoutConfig, ThemeConfig};
use threadlist::projection::{GroupHeader, ProjectionEngine, Record, RowView, ThreadAggregate};

pub fn render_projection(
    f: &mut Frame,
    area: Rect,
    engine: &ProjectionEngine,
    state: &mut ListState,
    title: &str,
    layout: &LayoutConfig,
    theme: &ThemeConfig,
) {
    // Available width: area minus borders (2) minus highlight symbol (2)
    let avail_width = area.width.saturating_sub(4) as usize;
    let offset = engine.grouping().offset();
    let columns = Columns::new(avail_width, layout);

    let items: Vec<ListItem> = engine
        .iter()
        .map(|row| match row {
            RowView::Header(header) => header_item(header, theme),
            RowView::Thread(thread) => thread_item(thread, &columns, offset, theme),
            RowView::Standalone(record) => record_item(record, 0, &columns, offset, theme),
            RowView::ThreadChild { record, .. } => {
                record_item(record, layout.child_indent, &columns, offset, theme)
            }
        })
        .collect();

    let list = List::new(items)
        .block(list_block(title, engine, theme))
        .style(Style::default().bg(theme.bg()))
        .highlight_style(
            Style::default()
                .bg(theme.selected_bg())
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    f.render_stateful_widget(list, area, state);
}

/// Border with the source title on the left and projection totals on the
/// right.
fn list_block<'a>(title: &'a str, engine: &ProjectionEngine, theme: &ThemeConfig) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border_active()))
        .title_style(Style::default().fg(theme.primary()))
        .title(Line::from(title))
        .title(Line::from(totals_label(engine)).right_aligned())
}

fn totals_label(engine: &ProjectionEngine) -> String {
    let groups = engine.headers().count();
    let threads = engine.threads().count();
    let mut label = format!(" {} in {} groups", engine.total_count(), groups);
    if threads > 0 {
        label.push_str(&format!(", {} threads", threads));
    }
    let unread = engine.total_unread_count();
    if unread > 0 {
        label.push_str(&format!(", {} unread", unread));
    }
    label.push(' ');
    label
}

struct Columns {
    date: usize,
    from: usize,
    subject: usize,
}

impl Columns {
    fn new(avail_width: usize, layout: &LayoutConfig) -> Self {
        // marker (2) + spacing (2)
        let date = layout.date_width;
        let from = layout.from_width.min(avail_width.saturating_sub(date + 4) / 3);
        let subject = avail_width.saturating_sub(date + from + 4);
        Self { date, from, subject }
    }
}

fn header_item<'a>(header: &GroupHeader, theme: &ThemeConfig) -> ListItem<'a> {
    let mut spans = vec![
        Span::styled(
            header.label().to_string(),
            Style::default()
                .fg(theme.primary())
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  {}", header.item_count()),
            Style::default().fg(theme.fg_muted()),
        ),
    ];
    if header.unread_count() > 0 {
        spans.push(Span::styled(
            format!(" ({} unread)", header.unread_count()),
            Style::default().fg(theme.unread()),
        ));
    }
    ListItem::new(Line::from(spans))
}

fn thread_item<'a>(
    thread: &ThreadAggregate,
    columns: &Columns,
    offset: FixedOffset,
    theme: &ThemeConfig,
) -> ListItem<'a> {
    let Some(lead) = thread.representative() else {
        return ListItem::new(Line::raw(""));
    };
    let unread = if thread.all_read() { " " } else { "*" };
    let fold = if thread.is_expanded() { "▾" } else { "▸" };
    let count = format!(" [{}]", thread.member_count());
    let subject_width = columns.subject.saturating_sub(count.chars().count());
    let line = format!(
        "{}{} {:dw$} {:fw$} {}{}",
        unread,
        fold,
        truncate(&format_date(lead.timestamp, offset), columns.date),
        truncate(lead.correspondent_display(), columns.from),
        truncate(subject_of(lead), subject_width),
        count,
        dw = columns.date,
        fw = columns.from,
    );
    ListItem::new(Line::raw(line)).style(row_style(!thread.all_read(), thread.is_selected, theme))
}

fn record_item<'a>(
    record: &Record,
    indent: usize,
    columns: &Columns,
    offset: FixedOffset,
    theme: &ThemeConfig,
) -> ListItem<'a> {
    let unread = if record.is_read { " " } else { "*" };
    let flag = if record.is_flagged {
        "!"
    } else if record.is_draft {
        "d"
    } else {
        " "
    };
    let line = format!(
        "{}{} {}{:dw$} {:fw$} {}",
        unread,
        flag,
        " ".repeat(indent),
        truncate(&format_date(record.timestamp, offset), columns.date),
        truncate(record.correspondent_display(), columns.from),
        truncate(subject_of(record), columns.subject.saturating_sub(indent)),
        dw = columns.date,
        fw = columns.from,
    );
    ListItem::new(Line::raw(line)).style(row_style(!record.is_read, record.is_selected, theme))
}

fn row_style(unread: bool, selected: bool, theme: &ThemeConfig) -> Style {
    let style = if unread {
        Style::default().fg(theme.unread())
    } else {
        Style::default().fg(theme.fg_subtle())
    };
    if selected {
        style.fg(theme.secondary()).add_modifier(Modifier::UNDERLINED)
    } else {
        style
    }
}

fn subject_of(record: &Record) -> &str {
    record.subject.as_deref().unwrap_or("(no subject)")
}

fn truncate(s: &str, max: usize) -> String {
    if max < 4 {
        return s.chars().take(max).collect();
    }
    let char_count = s.chars().count();
    if char_count <= max {
        format!("{:width$}", s, width = max)
    } else {
        let truncated: String = s.chars().take(max - 3).collect();
        format!("{}...", truncated)
    }
}

/// "Mar 12 09:30" in the grouping offset
fn format_date(timestamp: DateTime<Utc>, offset: FixedOffset) -> String {
    timestamp.with_timezone(&offset).format("%b %d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use threadlist::projection::{GroupKeyStrategy, GroupingMode, SortDirection};

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 6), "abc   ");
        assert_eq!(truncate("abcdefgh", 6), "abc...");
        assert_eq!(truncate("abcdef", 2), "ab");
    }

    #[test]
    fn test_format_date_uses_offset() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 12, 23, 30, 0).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(format_date(ts, utc), "Mar 12 23:30");
        assert_eq!(format_date(ts, plus_two), "Mar 13 01:30");
    }

    #[test]
    fn test_totals_label() {
        let today = chrono::NaiveDate::from_ymd_opt(2026, 3, 12).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let grouping = GroupKeyStrategy::new(GroupingMode::Date, utc, today);
        let mut engine = ProjectionEngine::new(grouping, SortDirection::Descending);
        assert_eq!(totals_label(&engine), " 0 in 0 groups ");

        let ts = |d| Utc.with_ymd_and_hms(2026, 3, d, 9, 0, 0).unwrap();
        engine
            .bulk_load(vec![
                Record::new("a", ts(12)).read(true),
                Record::new("b", ts(11)).with_conversation("x"),
                Record::new("c", ts(11)).with_conversation("x").read(true),
            ])
            .unwrap();
        assert_eq!(totals_label(&engine), " 3 in 2 groups, 1 threads, 1 unread ");
    }

    #[test]
    fn test_columns_shrink_on_narrow_terminals() {
        let layout = LayoutConfig::default();
        let wide = Columns::new(100, &layout);
        assert_eq!((wide.date, wide.from, wide.subject), (12, 20, 64));

        let narrow = Columns::new(40, &layout);
        assert_eq!(narrow.from, 8);
        assert_eq!(narrow.subject, 16);
    }
}
