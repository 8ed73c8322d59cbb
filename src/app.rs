use ratatui::{layout::Rect, widgets::ListState};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use tracing::warn;

use threadlist::ProjectionError;
use threadlist::config::Config;
use threadlist::mail::RecordSource;
use threadlist::projection::{
    GroupingMode, ProjectionChange, ProjectionEngine, Record, RowView, SortDirection,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum View {
    Loading,
    List,
}

/// Scan progress shared with the loader thread.
#[derive(Debug, Default)]
pub struct LoadProgress {
    done: AtomicUsize,
    total: AtomicUsize,
}

impl LoadProgress {
    pub fn set(&self, done: usize, total: usize) {
        self.done.store(done, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn get(&self) -> (usize, usize) {
        (
            self.done.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }
}

/// What the cursor is on, by identity rather than row number.
#[derive(Debug, Clone, PartialEq)]
enum Anchor {
    Record(String),
    Thread(String),
}

pub struct App {
    pub config: Config,
    pub engine: ProjectionEngine,
    pub source: RecordSource,
    pub view: View,
    pub list_state: ListState,
    pub list_area: Rect,
    pub should_quit: bool,
    pub status_message: Option<String>,
    pub progress: Arc<LoadProgress>,
    pending: Option<Receiver<anyhow::Result<Vec<Record>>>>,
    last_change: Rc<Cell<Option<ProjectionChange>>>,
}

impl App {
    pub fn new(config: Config, source: RecordSource) -> Self {
        let mut engine = ProjectionEngine::new(
            config.view.grouping_strategy(),
            config.view.direction,
        )
        .with_verification(config.view.verify());

        let last_change = Rc::new(Cell::new(None));
        let sink = Rc::clone(&last_change);
        engine.subscribe(move |change| sink.set(Some(*change)));

        Self {
            config,
            engine,
            source,
            view: View::List,
            list_state: ListState::default(),
            list_area: Rect::default(),
            should_quit: false,
            status_message: None,
            progress: Arc::new(LoadProgress::default()),
            pending: None,
            last_change,
        }
    }

    pub fn set_status(&mut self, msg: &str) {
        self.status_message = Some(msg.to_string());
    }

    pub fn clear_status(&mut self) {
        self.status_message = None;
    }

    // ── Loading ────────────────────────────────────────────────────────

    /// Load the source on a background thread; `poll_load` picks up the
    /// result.
    pub fn start_load(&mut self) {
        let (tx, rx) = mpsc::channel();
        let source = self.source.clone();
        let progress = Arc::clone(&self.progress);
        progress.set(0, 0);
        std::thread::spawn(move || {
            let result = source.load(|done, total| progress.set(done, total));
            let _ = tx.send(result);
        });
        self.pending = Some(rx);
        self.view = View::Loading;
    }

    /// Returns true when a load finished (successfully or not).
    pub fn poll_load(&mut self) -> bool {
        let Some(rx) = &self.pending else {
            return false;
        };
        let outcome = match rx.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Disconnected) => Err(anyhow::anyhow!("loader thread stopped")),
        };
        self.pending = None;
        self.view = View::List;
        match outcome {
            Ok(records) => self.load_records(records),
            Err(e) => {
                warn!(error = %e, "failed to load records");
                self.set_status(&format!("Load failed: {e:#}"));
            }
        }
        true
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn load_records(&mut self, records: Vec<Record>) {
        let anchor = self.anchor();
        let count = records.len();
        let result = self.engine.bulk_load(records);
        if self.apply(result) {
            self.restore(anchor);
            self.set_status(&format!("Loaded {} records", count));
        }
    }

    // ── Navigation ─────────────────────────────────────────────────────

    pub fn selected_row(&self) -> Option<RowView<'_>> {
        self.list_state.selected().and_then(|i| self.engine.row(i))
    }

    pub fn next(&mut self) {
        if self.engine.is_empty() {
            return;
        }
        let max = self.engine.len() - 1;
        let i = match self.list_state.selected() {
            Some(i) => (i + 1).min(max),
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.engine.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => i.saturating_sub(1),
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn list_visible_height(&self) -> usize {
        self.list_area.height.saturating_sub(2) as usize // -2 for top and bottom borders
    }

    /// Scroll list viewport down, moving selection if needed to stay in view
    pub fn scroll_list_down(&mut self, lines: usize) {
        if self.engine.is_empty() {
            return;
        }
        let visible_height = self.list_visible_height().max(1);
        let max_offset = self.engine.len().saturating_sub(1);
        let new_offset = (self.list_state.offset() + lines).min(max_offset);
        *self.list_state.offset_mut() = new_offset;

        if let Some(selected) = self.list_state.selected() {
            if selected < new_offset {
                self.list_state.select(Some(new_offset));
            } else if selected >= new_offset + visible_height {
                self.list_state
                    .select(Some(new_offset + visible_height - 1));
            }
        }
    }

    /// Scroll list viewport up, moving selection if needed to stay in view
    pub fn scroll_list_up(&mut self, lines: usize) {
        if self.engine.is_empty() {
            return;
        }
        let visible_height = self.list_visible_height().max(1);
        let new_offset = self.list_state.offset().saturating_sub(lines);
        *self.list_state.offset_mut() = new_offset;

        if let Some(selected) = self.list_state.selected() {
            let max_visible = new_offset + visible_height - 1;
            if selected > max_visible {
                self.list_state
                    .select(Some(max_visible.min(self.engine.len() - 1)));
            } else if selected < new_offset {
                self.list_state.select(Some(new_offset));
            }
        }
    }

    /// Select the row under a click; returns true if the selection moved.
    pub fn handle_click(&mut self, x: u16, y: u16) -> bool {
        let area = self.list_area;
        if x < area.x || x >= area.x + area.width || y <= area.y || y >= area.y + area.height {
            return false;
        }
        let row = (y - area.y - 1) as usize + self.list_state.offset(); // -1 for top border
        if row >= self.engine.len() || self.list_state.selected() == Some(row) {
            return false;
        }
        self.list_state.select(Some(row));
        true
    }

    // ── Actions ────────────────────────────────────────────────────────

    pub fn toggle_expansion(&mut self) {
        let conv = match self.selected_row() {
            Some(RowView::Thread(thread)) => thread.conversation_id().to_string(),
            Some(RowView::ThreadChild { thread, .. }) => thread.conversation_id().to_string(),
            _ => return,
        };
        let result = self.engine.toggle_expansion(&conv);
        if self.apply(result) {
            self.restore(Some(Anchor::Thread(conv)));
        }
    }

    /// Flip read state of the current record; on a thread row every member
    /// follows the representative.
    pub fn toggle_read(&mut self) {
        let (targets, now_read) = match self.selected_row() {
            Some(RowView::Thread(thread)) => {
                let read = !thread.all_read();
                let members: Vec<Record> = thread.members().cloned().collect();
                (members, read)
            }
            Some(RowView::Standalone(record)) | Some(RowView::ThreadChild { record, .. }) => {
                (vec![record.clone()], !record.is_read)
            }
            _ => return,
        };
        let anchor = self.anchor();
        for record in targets {
            let result = self.engine.update(record.read(now_read));
            if !self.apply(result) {
                return;
            }
        }
        self.restore(anchor);
        self.set_status(if now_read { "Marked read" } else { "Marked unread" });
    }

    pub fn toggle_selection(&mut self) {
        let changed = match self.selected_row() {
            Some(RowView::Thread(thread)) => {
                let conv = thread.conversation_id().to_string();
                let selected = !thread.is_selected;
                self.engine.set_thread_selected(&conv, selected)
            }
            Some(RowView::Standalone(record)) | Some(RowView::ThreadChild { record, .. }) => {
                let uid = record.unique_id.clone();
                let selected = !record.is_selected;
                self.engine.set_selected(&uid, selected)
            }
            _ => false,
        };
        if changed {
            let count = self.engine.selected_count();
            self.set_status(&format!("{} selected", count));
        }
    }

    pub fn cycle_grouping(&mut self) {
        let mode = self.engine.mode().next();
        let direction = self.engine.direction();
        self.regroup(mode, direction);
    }

    pub fn flip_direction(&mut self) {
        let mode = self.engine.mode();
        let direction = self.engine.direction().flipped();
        self.regroup(mode, direction);
    }

    fn regroup(&mut self, mode: GroupingMode, direction: SortDirection) {
        let anchor = self.anchor();
        let result = self.engine.change_grouping(mode, direction);
        if self.apply(result) {
            self.restore(anchor);
            self.set_status(&format!("Grouped by {}, {}", mode.name(), direction.name()));
        }
    }

    /// Remove the current record, or every member of the current thread.
    pub fn remove_current(&mut self) {
        let targets: Vec<String> = match self.selected_row() {
            Some(RowView::Thread(thread)) => {
                thread.members().map(|r| r.unique_id.clone()).collect()
            }
            Some(RowView::Standalone(record)) | Some(RowView::ThreadChild { record, .. }) => {
                vec![record.unique_id.clone()]
            }
            _ => return,
        };
        let count = targets.len();
        for uid in targets {
            let result = self.engine.remove(&uid);
            if !self.apply(result) {
                return;
            }
        }
        self.clamp_selection();
        self.set_status(&format!("Removed {} record(s)", count));
    }

    /// Relabel date headers once the day rolls over.
    pub fn refresh_day(&mut self) {
        let today = chrono::Utc::now()
            .with_timezone(&self.engine.grouping().offset())
            .date_naive();
        let result = self.engine.refresh_labels(today);
        self.apply(result);
    }

    // ── Helpers ────────────────────────────────────────────────────────

    /// Report a mutation outcome; returns false when it was rejected.
    fn apply(&mut self, result: Result<ProjectionChange, ProjectionError>) -> bool {
        match result {
            Ok(_) => {
                if let Some(change) = self.last_change.take() {
                    if change.rows_after < change.rows_before {
                        self.clamp_selection();
                    }
                }
                true
            }
            Err(e) => {
                self.set_status(&e.to_string());
                false
            }
        }
    }

    fn anchor(&self) -> Option<Anchor> {
        match self.selected_row()? {
            RowView::Thread(thread) => Some(Anchor::Thread(thread.conversation_id().to_string())),
            RowView::Standalone(record) | RowView::ThreadChild { record, .. } => {
                Some(Anchor::Record(record.unique_id.clone()))
            }
            RowView::Header(_) => None,
        }
    }

    fn restore(&mut self, anchor: Option<Anchor>) {
        let pos = match anchor {
            Some(Anchor::Record(uid)) => self.engine.position_of(&uid),
            Some(Anchor::Thread(conv)) => self.engine.position_of_thread(&conv),
            None => None,
        };
        match pos {
            Some(pos) => self.list_state.select(Some(pos)),
            None => self.clamp_selection(),
        }
    }

    fn clamp_selection(&mut self) {
        if self.engine.is_empty() {
            self.list_state.select(None);
            return;
        }
        let max = self.engine.len() - 1;
        let i = self.list_state.selected().unwrap_or(0).min(max);
        self.list_state.select(Some(i));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn app() -> App {
        let mut config = Config::default();
        config.view.utc_offset_minutes = Some(0);
        config.view.verify_invariants = Some(true);
        let mut app = App::new(config, RecordSource::Json(PathBuf::from("unused.json")));
        let ts = |h| Utc.with_ymd_and_hms(2026, 3, 12, h, 0, 0).unwrap();
        app.load_records(vec![
            Record::new("a", ts(12)),
            Record::new("c", ts(9)).with_conversation("x"),
            Record::new("d", ts(10)).with_conversation("x"),
        ]);
        app
    }

    fn uid_at_cursor(app: &App) -> Option<String> {
        app.selected_row()
            .and_then(|row| row.record())
            .map(|r| r.unique_id.clone())
    }

    #[test]
    fn test_load_selects_first_row() {
        let app = app();
        // descending by default: header, a, thread x
        assert_eq!(app.list_state.selected(), Some(0));
        assert_eq!(app.engine.len(), 3);
        assert_eq!(app.status_message.as_deref(), Some("Loaded 3 records"));
    }

    #[test]
    fn test_expand_keeps_cursor_on_thread() {
        let mut app = app();
        app.list_state.select(Some(2));
        app.toggle_expansion();
        assert_eq!(app.engine.len(), 5);
        assert!(matches!(app.selected_row(), Some(RowView::Thread(_))));

        // collapsing from a child lands on the thread row
        app.next();
        app.toggle_expansion();
        assert_eq!(app.engine.len(), 3);
        assert_eq!(app.list_state.selected(), Some(2));
    }

    #[test]
    fn test_toggle_read_on_thread_marks_all_members() {
        let mut app = app();
        app.list_state.select(Some(2));
        app.toggle_read();
        assert!(app.engine.thread("x").is_some_and(|t| t.all_read()));
        assert_eq!(app.engine.total_unread_count(), 1);
        assert_eq!(app.status_message.as_deref(), Some("Marked read"));
    }

    #[test]
    fn test_regroup_follows_cursor() {
        let mut app = app();
        app.list_state.select(Some(1));
        assert_eq!(uid_at_cursor(&app).as_deref(), Some("a"));
        app.flip_direction();
        assert_eq!(uid_at_cursor(&app).as_deref(), Some("a"));
        assert_eq!(app.list_state.selected(), Some(2));
    }

    #[test]
    fn test_remove_thread_and_clamp() {
        let mut app = app();
        app.list_state.select(Some(2));
        app.remove_current();
        assert_eq!(app.engine.total_count(), 1);
        assert_eq!(app.list_state.selected(), Some(1));

        app.remove_current();
        assert!(app.engine.is_empty());
        assert_eq!(app.list_state.selected(), None);
    }

    #[test]
    fn test_selection_toggle() {
        let mut app = app();
        app.list_state.select(Some(2));
        app.toggle_selection();
        assert_eq!(app.engine.selected_count(), 2);
        app.list_state.select(Some(1));
        app.toggle_selection();
        assert_eq!(app.status_message.as_deref(), Some("3 selected"));
    }
}
