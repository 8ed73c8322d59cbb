use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, trace, warn};

use super::grouping::{GroupKey, GroupKeyStrategy, GroupingMode};
use super::header::GroupHeader;
use super::index::PositionIndex;
use super::record::Record;
use super::row::{Row, RowView};
use super::sorting::{SortDirection, SortKey, SortStrategy};
use super::thread::ThreadAggregate;
use crate::error::ProjectionError;

/// Where the engine keeps a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Location {
    Standalone,
    Thread(String),
}

/// A top-level projection item: a standalone record or a whole thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Item {
    Standalone(String),
    Thread(String),
}

impl Item {
    fn row(&self) -> Row {
        match self {
            Item::Standalone(uid) => Row::Standalone(uid.clone()),
            Item::Thread(conv) => Row::Thread(conv.clone()),
        }
    }
}

/// Group and sort slot of an item, computed from its current data.
struct Anchor {
    key: GroupKey,
    timestamp: DateTime<Utc>,
    unique_id: String,
}

impl Anchor {
    fn sort_key(&self) -> SortKey<'_> {
        SortKey {
            timestamp: self.timestamp,
            unique_id: &self.unique_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Nothing observable changed.
    Unchanged,
    /// Row data changed in place; the row sequence is the same.
    Content,
    /// Rows were inserted, removed or moved.
    Structure,
    /// The projection was rebuilt from scratch.
    Reset,
}

/// Emitted once per logical mutation, after the projection is consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionChange {
    pub kind: ChangeKind,
    pub rows_before: usize,
    pub rows_after: usize,
}

impl ProjectionChange {
    pub fn is_unchanged(&self) -> bool {
        self.kind == ChangeKind::Unchanged
    }
}

type Observer = Box<dyn FnMut(&ProjectionChange)>;

/// Grouped, sorted and threaded flat projection of a record set.
///
/// The engine exclusively owns the records it was given, the thread table,
/// the group headers, the position index and the row sequence. Callers read
/// rows by reference and mutate only through the methods below.
pub struct ProjectionEngine {
    pub(super) grouping: GroupKeyStrategy,
    pub(super) sorting: SortStrategy,
    pub(super) standalone: HashMap<String, Record>,
    pub(super) threads: HashMap<String, ThreadAggregate>,
    pub(super) locations: HashMap<String, Location>,
    // conversation id -> the single standalone record carrying it
    pub(super) loose: HashMap<String, String>,
    pub(super) headers: HashMap<GroupKey, GroupHeader>,
    pub(super) index: PositionIndex,
    pub(super) rows: Vec<Row>,
    mutating: bool,
    verify: bool,
    observers: Vec<Observer>,
}

impl fmt::Debug for ProjectionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionEngine")
            .field("mode", &self.grouping.mode())
            .field("direction", &self.sorting.direction())
            .field("records", &self.locations.len())
            .field("threads", &self.threads.len())
            .field("groups", &self.headers.len())
            .field("rows", &self.rows.len())
            .finish_non_exhaustive()
    }
}

impl ProjectionEngine {
    pub fn new(grouping: GroupKeyStrategy, direction: SortDirection) -> Self {
        Self {
            grouping,
            sorting: SortStrategy::new(direction),
            standalone: HashMap::new(),
            threads: HashMap::new(),
            locations: HashMap::new(),
            loose: HashMap::new(),
            headers: HashMap::new(),
            index: PositionIndex::new(),
            rows: Vec::new(),
            mutating: false,
            verify: cfg!(debug_assertions),
            observers: Vec::new(),
        }
    }

    /// Turns the full invariant check after every mutation on or off.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Registers a callback invoked once after each mutation that changed
    /// something.
    pub fn subscribe(&mut self, observer: impl FnMut(&ProjectionChange) + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn is_mutating(&self) -> bool {
        self.mutating
    }

    // ── Mutations ──────────────────────────────────────────────────────

    pub fn add(&mut self, record: Record) -> Result<ProjectionChange, ProjectionError> {
        self.mutate("add", |engine| engine.add_record(record))
    }

    pub fn remove(&mut self, unique_id: &str) -> Result<ProjectionChange, ProjectionError> {
        self.mutate("remove", |engine| engine.remove_record(unique_id))
    }

    pub fn update(&mut self, record: Record) -> Result<ProjectionChange, ProjectionError> {
        self.mutate("update", |engine| engine.update_record(record))
    }

    /// Replaces the whole record set and rebuilds the projection once.
    pub fn bulk_load(
        &mut self,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<ProjectionChange, ProjectionError> {
        self.mutate("bulk_load", |engine| {
            engine.reset_state();
            engine.ingest(records);
            engine.rebuild();
            ChangeKind::Reset
        })
    }

    /// Regroups and resorts the current record set. Threads and their
    /// expansion state are kept.
    pub fn change_grouping(
        &mut self,
        mode: GroupingMode,
        direction: SortDirection,
    ) -> Result<ProjectionChange, ProjectionError> {
        self.mutate("change_grouping", |engine| {
            engine.grouping.set_mode(mode);
            engine.sorting.set_direction(direction);
            engine.rebuild();
            ChangeKind::Reset
        })
    }

    pub fn toggle_expansion(
        &mut self,
        conversation_id: &str,
    ) -> Result<ProjectionChange, ProjectionError> {
        self.mutate("toggle_expansion", |engine| {
            engine.expand_thread(conversation_id, None)
        })
    }

    pub fn set_expanded(
        &mut self,
        conversation_id: &str,
        expanded: bool,
    ) -> Result<ProjectionChange, ProjectionError> {
        self.mutate("set_expanded", |engine| {
            engine.expand_thread(conversation_id, Some(expanded))
        })
    }

    pub fn clear(&mut self) -> Result<ProjectionChange, ProjectionError> {
        self.mutate("clear", |engine| {
            if engine.locations.is_empty() && engine.rows.is_empty() {
                return ChangeKind::Unchanged;
            }
            engine.reset_state();
            ChangeKind::Reset
        })
    }

    /// Recomputes date labels ("Today", "Yesterday", ...) for a new day.
    pub fn refresh_labels(&mut self, today: NaiveDate) -> Result<ProjectionChange, ProjectionError> {
        self.mutate("refresh_labels", |engine| {
            if engine.grouping.today() == today {
                return ChangeKind::Unchanged;
            }
            engine.grouping.set_today(today);
            let grouping = engine.grouping;
            for header in engine.headers.values_mut() {
                let label = grouping.label_of(header.key());
                header.set_label(label);
            }
            ChangeKind::Content
        })
    }

    /// Selection is a property of the record; the projection shape is
    /// untouched. Returns false for unknown ids.
    pub fn set_selected(&mut self, unique_id: &str, selected: bool) -> bool {
        let record = match self.locations.get(unique_id) {
            Some(Location::Standalone) => self.standalone.get_mut(unique_id),
            Some(Location::Thread(conv)) => self
                .threads
                .get_mut(conv)
                .and_then(|t| t.member_by_id_mut(unique_id)),
            None => None,
        };
        match record {
            Some(record) => {
                record.is_selected = selected;
                true
            }
            None => false,
        }
    }

    pub fn set_thread_selected(&mut self, conversation_id: &str, selected: bool) -> bool {
        match self.threads.get_mut(conversation_id) {
            Some(thread) => {
                thread.is_selected = selected;
                true
            }
            None => false,
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, pos: usize) -> Option<RowView<'_>> {
        self.rows.get(pos).and_then(|row| self.resolve(row))
    }

    pub fn iter(&self) -> impl Iterator<Item = RowView<'_>> + '_ {
        self.rows.iter().filter_map(|row| self.resolve(row))
    }

    pub fn resolve(&self, row: &Row) -> Option<RowView<'_>> {
        match row {
            Row::Header(key) => self.headers.get(key).map(RowView::Header),
            Row::Thread(conv) => self.threads.get(conv).map(RowView::Thread),
            Row::Standalone(uid) => self.standalone.get(uid).map(RowView::Standalone),
            Row::ThreadChild {
                conversation_id,
                unique_id,
            } => {
                let thread = self.threads.get(conversation_id)?;
                let record = thread.member_by_id(unique_id)?;
                Some(RowView::ThreadChild { thread, record })
            }
        }
    }

    pub fn mode(&self) -> GroupingMode {
        self.grouping.mode()
    }

    pub fn direction(&self) -> SortDirection {
        self.sorting.direction()
    }

    pub fn grouping(&self) -> &GroupKeyStrategy {
        &self.grouping
    }

    pub fn sorting(&self) -> &SortStrategy {
        &self.sorting
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.locations.contains_key(unique_id)
    }

    pub fn record(&self, unique_id: &str) -> Option<&Record> {
        match self.locations.get(unique_id)? {
            Location::Standalone => self.standalone.get(unique_id),
            Location::Thread(conv) => self.threads.get(conv)?.member_by_id(unique_id),
        }
    }

    /// Every record the engine holds, in no particular order.
    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.standalone
            .values()
            .chain(self.threads.values().flat_map(|t| t.members()))
    }

    pub fn thread(&self, conversation_id: &str) -> Option<&ThreadAggregate> {
        self.threads.get(conversation_id)
    }

    pub fn threads(&self) -> impl Iterator<Item = &ThreadAggregate> + '_ {
        self.threads.values()
    }

    pub fn header(&self, key: &GroupKey) -> Option<&GroupHeader> {
        self.headers.get(key)
    }

    /// Headers in projection order.
    pub fn headers(&self) -> impl Iterator<Item = &GroupHeader> + '_ {
        self.rows.iter().filter_map(|row| match row {
            Row::Header(key) => self.headers.get(key),
            _ => None,
        })
    }

    /// Row that currently shows `unique_id`: its own row, or the thread row
    /// when it sits in a collapsed thread.
    pub fn position_of(&self, unique_id: &str) -> Option<usize> {
        match self.locations.get(unique_id)? {
            Location::Standalone => self
                .locate(&Item::Standalone(unique_id.to_string()))
                .map(|(_, pos)| pos),
            Location::Thread(conv) => {
                let expanded = self.threads.get(conv)?.is_expanded();
                if expanded {
                    self.child_row(conv, unique_id)
                } else {
                    self.position_of_thread(conv)
                }
            }
        }
    }

    pub fn position_of_thread(&self, conversation_id: &str) -> Option<usize> {
        self.locate(&Item::Thread(conversation_id.to_string()))
            .map(|(_, pos)| pos)
    }

    pub fn total_count(&self) -> usize {
        self.locations.len()
    }

    pub fn total_unread_count(&self) -> usize {
        let loose = self.standalone.values().filter(|r| !r.is_read).count();
        let threaded: usize = self.threads.values().map(|t| t.unread_count()).sum();
        loose + threaded
    }

    /// Selected records in projection order. A selected thread selects all
    /// of its members; otherwise members count on their own.
    pub fn selected_records(&self) -> Vec<&Record> {
        let mut selected = Vec::new();
        for row in &self.rows {
            match row {
                Row::Standalone(uid) => {
                    if let Some(record) = self.standalone.get(uid) {
                        if record.is_selected {
                            selected.push(record);
                        }
                    }
                }
                Row::Thread(conv) => {
                    if let Some(thread) = self.threads.get(conv) {
                        selected.extend(
                            thread
                                .sorted_members(&self.sorting)
                                .into_iter()
                                .filter(|m| thread.is_selected || m.is_selected),
                        );
                    }
                }
                Row::Header(_) | Row::ThreadChild { .. } => {}
            }
        }
        selected
    }

    pub fn selected_count(&self) -> usize {
        self.selected_records().len()
    }

    // ── Mutation plumbing ──────────────────────────────────────────────

    fn mutate(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Self) -> ChangeKind,
    ) -> Result<ProjectionChange, ProjectionError> {
        if self.mutating {
            warn!(op, "rejected re-entrant projection mutation");
            return Err(ProjectionError::Reentrant { op });
        }
        self.mutating = true;
        let rows_before = self.rows.len();
        let kind = f(self);

        if self.verify && kind != ChangeKind::Unchanged {
            if let Err(violation) = self.validate() {
                panic!("projection invariant violated after {op}: {violation}");
            }
        }

        let change = ProjectionChange {
            kind,
            rows_before,
            rows_after: self.rows.len(),
        };
        if kind != ChangeKind::Unchanged {
            debug!(op, ?kind, rows_before, rows_after = change.rows_after, "projection changed");
            for observer in &mut self.observers {
                observer(&change);
            }
        }
        // held until observers have seen the finished projection
        self.mutating = false;
        Ok(change)
    }

    fn add_record(&mut self, record: Record) -> ChangeKind {
        if !record.has_identity() {
            debug!(id = %record.id, "ignoring record without unique id");
            return ChangeKind::Unchanged;
        }
        if self.locations.contains_key(&record.unique_id) {
            return self.update_record(record);
        }
        match record.conversation().map(str::to_string) {
            Some(conv) if self.threads.contains_key(&conv) => self.join_thread(&conv, record),
            Some(conv) if self.loose.contains_key(&conv) => self.form_thread(&conv, record),
            _ => self.insert_standalone(record),
        }
    }

    fn remove_record(&mut self, unique_id: &str) -> ChangeKind {
        let Some(location) = self.locations.get(unique_id).cloned() else {
            debug!(unique_id, "ignoring removal of unknown record");
            return ChangeKind::Unchanged;
        };
        match location {
            Location::Standalone => {
                let old_key = self.unplace(&Item::Standalone(unique_id.to_string()));
                self.locations.remove(unique_id);
                if let Some(record) = self.standalone.remove(unique_id) {
                    if let Some(conv) = record.conversation() {
                        self.loose.remove(conv);
                    }
                }
                self.prune(old_key);
            }
            Location::Thread(conv) => self.leave_thread(&conv, unique_id),
        }
        ChangeKind::Structure
    }

    fn update_record(&mut self, record: Record) -> ChangeKind {
        if !record.has_identity() {
            debug!(id = %record.id, "ignoring update without unique id");
            return ChangeKind::Unchanged;
        }
        let uid = record.unique_id.clone();
        let Some(location) = self.locations.get(&uid).cloned() else {
            debug!(unique_id = %uid, "ignoring update of unknown record");
            return ChangeKind::Unchanged;
        };
        let (item, old) = match &location {
            Location::Standalone => (Item::Standalone(uid.clone()), self.standalone.get(&uid)),
            Location::Thread(conv) => (
                Item::Thread(conv.clone()),
                self.threads.get(conv).and_then(|t| t.member_by_id(&uid)),
            ),
        };
        let Some(old) = old else {
            return ChangeKind::Unchanged;
        };
        if *old == record {
            return ChangeKind::Unchanged;
        }

        if old.conversation() != record.conversation() {
            // threading follows the conversation id, so move it like new mail
            debug!(unique_id = %uid, "conversation changed, re-threading");
            self.remove_record(&uid);
            self.add_record(record);
            return ChangeKind::Structure;
        }

        let moved = old.timestamp != record.timestamp
            || old.correspondent_name != record.correspondent_name;
        if moved {
            let old_key = self.unplace(&item);
            self.store(&location, record);
            self.place(&item);
            self.prune(old_key);
            return ChangeKind::Structure;
        }

        let was_read = old.is_read;
        let is_read = record.is_read;
        let key = self.anchor_of(&item).map(|a| a.key);
        self.store(&location, record);
        if let Some(header) = key.and_then(|k| self.headers.get_mut(&k)) {
            header.mark_read(was_read, is_read);
        }
        ChangeKind::Content
    }

    fn store(&mut self, location: &Location, record: Record) {
        match location {
            Location::Standalone => {
                self.standalone.insert(record.unique_id.clone(), record);
            }
            Location::Thread(conv) => {
                if let Some(thread) = self.threads.get_mut(conv) {
                    thread.add_member(record);
                }
            }
        }
    }

    fn insert_standalone(&mut self, record: Record) -> ChangeKind {
        let uid = record.unique_id.clone();
        if let Some(conv) = record.conversation() {
            self.loose.insert(conv.to_string(), uid.clone());
        }
        self.locations.insert(uid.clone(), Location::Standalone);
        self.standalone.insert(uid.clone(), record);
        self.place(&Item::Standalone(uid));
        ChangeKind::Structure
    }

    /// Second record of a conversation: the standalone one and the newcomer
    /// collapse into a thread.
    fn form_thread(&mut self, conv: &str, record: Record) -> ChangeKind {
        let Some(existing_uid) = self.loose.remove(conv) else {
            return self.insert_standalone(record);
        };
        let old_key = self.unplace(&Item::Standalone(existing_uid.clone()));
        let Some(existing) = self.standalone.remove(&existing_uid) else {
            self.prune(old_key);
            return self.insert_standalone(record);
        };

        self.locations
            .insert(existing_uid, Location::Thread(conv.to_string()));
        self.locations
            .insert(record.unique_id.clone(), Location::Thread(conv.to_string()));
        self.threads
            .insert(conv.to_string(), ThreadAggregate::new(conv, [existing, record]));
        self.place(&Item::Thread(conv.to_string()));
        self.prune(old_key);
        debug!(conversation_id = conv, "formed thread");
        ChangeKind::Structure
    }

    fn join_thread(&mut self, conv: &str, record: Record) -> ChangeKind {
        let uid = record.unique_id.clone();
        let item = Item::Thread(conv.to_string());
        let leads = self.threads.get(conv).is_some_and(|t| t.would_lead(&record));
        self.locations
            .insert(uid.clone(), Location::Thread(conv.to_string()));

        if leads {
            // the newest member decides group and slot, so the footprint moves
            let old_key = self.unplace(&item);
            self.store(&Location::Thread(conv.to_string()), record);
            self.place(&item);
            self.prune(old_key);
            return ChangeKind::Structure;
        }

        let unread = usize::from(!record.is_read);
        let key = self.anchor_of(&item).map(|a| a.key);
        let expanded = self.threads.get(conv).is_some_and(|t| t.is_expanded());
        self.store(&Location::Thread(conv.to_string()), record);
        let Some(key) = key else {
            return ChangeKind::Content;
        };
        if let Some(header) = self.headers.get_mut(&key) {
            header.add(1, unread);
        }
        if !expanded {
            return ChangeKind::Content;
        }
        if let Some(at) = self.child_row(conv, &uid) {
            let child = Row::ThreadChild {
                conversation_id: conv.to_string(),
                unique_id: uid,
            };
            self.splice_in(at, vec![child], &key);
        }
        ChangeKind::Structure
    }

    fn leave_thread(&mut self, conv: &str, unique_id: &str) {
        let Some(thread) = self.threads.get(conv) else {
            return;
        };
        let remaining = thread.member_count().saturating_sub(1);
        let leads = thread
            .representative()
            .is_some_and(|r| r.unique_id == unique_id);
        let expanded = thread.is_expanded();
        let item = Item::Thread(conv.to_string());
        self.locations.remove(unique_id);

        if remaining >= 2 && !leads {
            let key = self.anchor_of(&item).map(|a| a.key);
            let child_at = if expanded {
                self.child_row(conv, unique_id)
            } else {
                None
            };
            let removed = self
                .threads
                .get_mut(conv)
                .and_then(|t| t.remove_member(unique_id));
            let (Some(key), Some(removed)) = (key, removed) else {
                return;
            };
            if let Some(header) = self.headers.get_mut(&key) {
                header.subtract(1, usize::from(!removed.is_read));
            }
            if let Some(at) = child_at {
                self.splice_out(at, 1, &key);
            }
            return;
        }

        let old_key = self.unplace(&item);
        if remaining >= 2 {
            if let Some(thread) = self.threads.get_mut(conv) {
                thread.remove_member(unique_id);
            }
            self.place(&item);
        } else if let Some(mut thread) = self.threads.remove(conv) {
            thread.remove_member(unique_id);
            debug!(conversation_id = conv, remaining, "dissolved thread");
            for survivor in thread.into_members() {
                self.insert_standalone(survivor);
            }
        }
        self.prune(old_key);
    }

    fn expand_thread(&mut self, conv: &str, target: Option<bool>) -> ChangeKind {
        let Some(thread) = self.threads.get(conv) else {
            debug!(conversation_id = conv, "ignoring expansion of unknown thread");
            return ChangeKind::Unchanged;
        };
        let expand = target.unwrap_or(!thread.is_expanded());
        if expand == thread.is_expanded() {
            return ChangeKind::Unchanged;
        }
        let members = thread.member_count();
        let Some((key, pos)) = self.locate(&Item::Thread(conv.to_string())) else {
            return ChangeKind::Unchanged;
        };
        if expand {
            let children = self.child_rows(conv);
            self.splice_in(pos + 1, children, &key);
        } else {
            self.splice_out(pos + 1, members, &key);
        }
        if let Some(thread) = self.threads.get_mut(conv) {
            thread.set_expanded(expand);
        }
        ChangeKind::Structure
    }

    // ── Placement primitives ───────────────────────────────────────────

    fn anchor_of(&self, item: &Item) -> Option<Anchor> {
        match item {
            Item::Standalone(uid) => {
                let record = self.standalone.get(uid)?;
                Some(Anchor {
                    key: self.grouping.key_of(record),
                    timestamp: record.timestamp,
                    unique_id: record.unique_id.clone(),
                })
            }
            Item::Thread(conv) => {
                let thread = self.threads.get(conv)?;
                let lead = thread.representative()?;
                Some(Anchor {
                    key: self.grouping.key_of(lead),
                    timestamp: thread.latest_timestamp(),
                    unique_id: lead.unique_id.clone(),
                })
            }
        }
    }

    /// Sort key of the item a row belongs to; thread children answer with
    /// their thread's key so a group span stays monotonic.
    pub(super) fn row_sort_key(&self, row: &Row) -> Option<SortKey<'_>> {
        match row {
            Row::Header(_) => None,
            Row::Standalone(uid) => self.standalone.get(uid).map(SortKey::of),
            Row::Thread(conv)
            | Row::ThreadChild {
                conversation_id: conv,
                ..
            } => self.threads.get(conv).map(ThreadAggregate::sort_key),
        }
    }

    fn group_span(&self, key: &GroupKey) -> Option<Range<usize>> {
        let offset = self.index.offset_of(key)?;
        let span = self.headers.get(key)?.span;
        Some(offset + 1..offset + 1 + span)
    }

    /// First row in `span` whose item sorts at or after `probe`.
    fn slot_in(&self, span: Range<usize>, probe: &SortKey<'_>) -> usize {
        let Some(rows) = self.rows.get(span.clone()) else {
            return span.start;
        };
        span.start
            + rows.partition_point(|row| {
                self.row_sort_key(row)
                    .is_some_and(|k| self.sorting.compare(&k, probe) == Ordering::Less)
            })
    }

    fn locate(&self, item: &Item) -> Option<(GroupKey, usize)> {
        let anchor = self.anchor_of(item)?;
        let span = self.group_span(&anchor.key)?;
        let at = self.slot_in(span.clone(), &anchor.sort_key());
        let expected = item.row();
        let found = self.rows.get(at) == Some(&expected);
        debug_assert!(found, "{expected:?} not at its sorted slot in {}", anchor.key);
        if found {
            return Some((anchor.key, at));
        }
        let pos = span.start
            + self
                .rows
                .get(span)?
                .iter()
                .position(|row| *row == expected)?;
        Some((anchor.key, pos))
    }

    fn child_rows(&self, conv: &str) -> Vec<Row> {
        self.threads
            .get(conv)
            .map(|thread| {
                thread
                    .sorted_members(&self.sorting)
                    .into_iter()
                    .map(|m| Row::ThreadChild {
                        conversation_id: conv.to_string(),
                        unique_id: m.unique_id.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Row of `unique_id` among its thread's children, assuming the thread
    /// is expanded.
    fn child_row(&self, conv: &str, unique_id: &str) -> Option<usize> {
        let thread = self.threads.get(conv)?;
        let offset = thread
            .sorted_members(&self.sorting)
            .iter()
            .position(|m| m.unique_id == unique_id)?;
        let pos = self.position_of_thread(conv)?;
        Some(pos + 1 + offset)
    }

    pub(super) fn footprint(&self, item: &Item) -> Vec<Row> {
        match item {
            Item::Standalone(_) => vec![item.row()],
            Item::Thread(conv) => {
                let mut rows = vec![item.row()];
                if self.threads.get(conv).is_some_and(|t| t.is_expanded()) {
                    rows.extend(self.child_rows(conv));
                }
                rows
            }
        }
    }

    fn footprint_len(&self, item: &Item) -> usize {
        match item {
            Item::Standalone(_) => 1,
            Item::Thread(conv) => match self.threads.get(conv) {
                Some(thread) if thread.is_expanded() => 1 + thread.member_count(),
                _ => 1,
            },
        }
    }

    /// (records, unread records) an item contributes to its header.
    pub(super) fn tally(&self, item: &Item) -> (usize, usize) {
        match item {
            Item::Standalone(uid) => self
                .standalone
                .get(uid)
                .map_or((0, 0), |r| (1, usize::from(!r.is_read))),
            Item::Thread(conv) => self
                .threads
                .get(conv)
                .map_or((0, 0), |t| (t.member_count(), t.unread_count())),
        }
    }

    fn place(&mut self, item: &Item) {
        let Some(anchor) = self.anchor_of(item) else {
            return;
        };
        self.open_group(&anchor.key);
        let Some(span) = self.group_span(&anchor.key) else {
            return;
        };
        let at = self.slot_in(span, &anchor.sort_key());
        let rows = self.footprint(item);
        let (items, unread) = self.tally(item);
        self.splice_in(at, rows, &anchor.key);
        if let Some(header) = self.headers.get_mut(&anchor.key) {
            header.add(items, unread);
        }
    }

    /// Takes an item's rows out of the projection. The header stays even if
    /// it empties; callers `prune` once the mutation is complete.
    fn unplace(&mut self, item: &Item) -> Option<GroupKey> {
        let (key, at) = self.locate(item)?;
        let len = self.footprint_len(item);
        let (items, unread) = self.tally(item);
        self.splice_out(at, len, &key);
        if let Some(header) = self.headers.get_mut(&key) {
            header.subtract(items, unread);
        }
        Some(key)
    }

    fn open_group(&mut self, key: &GroupKey) {
        if self.headers.contains_key(key) {
            return;
        }
        let label = self.grouping.label_of(key);
        let at = self
            .index
            .insertion_offset(key, &self.sorting, self.rows.len());
        self.rows.insert(at, Row::Header(key.clone()));
        self.index.shift_from(at, 1);
        self.index.set_offset(key.clone(), at);
        trace!(group = %key, at, "opened group");
        self.headers
            .insert(key.clone(), GroupHeader::new(key.clone(), label));
    }

    fn prune(&mut self, key: Option<GroupKey>) {
        let Some(key) = key else {
            return;
        };
        let empty = self.headers.get(&key).is_some_and(|h| h.item_count() == 0);
        if !empty {
            return;
        }
        debug_assert_eq!(self.headers.get(&key).map(|h| h.span), Some(0));
        self.headers.remove(&key);
        if let Some(at) = self.index.remove(&key) {
            if at < self.rows.len() {
                self.rows.remove(at);
                self.index.shift_from(at, -1);
            }
            trace!(group = %key, at, "closed group");
        }
    }

    fn splice_in(&mut self, at: usize, rows: Vec<Row>, key: &GroupKey) {
        let count = rows.len();
        if count == 0 {
            return;
        }
        self.rows.splice(at..at, rows);
        self.index.shift_from(at, count as isize);
        if let Some(header) = self.headers.get_mut(key) {
            header.span += count;
        }
        trace!(group = %key, at, count, "spliced rows in");
    }

    fn splice_out(&mut self, at: usize, count: usize, key: &GroupKey) {
        if count == 0 {
            return;
        }
        let end = (at + count).min(self.rows.len());
        self.rows.drain(at..end);
        self.index.shift_from(at, -((end - at) as isize));
        if let Some(header) = self.headers.get_mut(key) {
            header.span = header.span.saturating_sub(end - at);
        }
        trace!(group = %key, at, count, "spliced rows out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn test_reentrant_mutation_is_rejected() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 12).unwrap();
        let grouping = GroupKeyStrategy::new(
            GroupingMode::Date,
            FixedOffset::east_opt(0).unwrap(),
            today,
        );
        let mut engine = ProjectionEngine::new(grouping, SortDirection::Ascending);
        let ts = Utc.with_ymd_and_hms(2026, 3, 12, 9, 0, 0).unwrap();

        engine.mutating = true;
        assert_eq!(
            engine.add(Record::new("a", ts)),
            Err(ProjectionError::Reentrant { op: "add" })
        );
        assert!(engine.is_empty());

        engine.mutating = false;
        assert!(engine.add(Record::new("a", ts)).is_ok());
        assert!(!engine.is_mutating());
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_nested_mutation_is_rejected_until_observers_ran() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 12).unwrap();
        let grouping = GroupKeyStrategy::new(
            GroupingMode::Date,
            FixedOffset::east_opt(0).unwrap(),
            today,
        );
        let mut engine = ProjectionEngine::new(grouping, SortDirection::Ascending);
        let ts = Utc.with_ymd_and_hms(2026, 3, 12, 9, 0, 0).unwrap();

        let notified = std::rc::Rc::new(std::cell::Cell::new(0));
        let seen = std::rc::Rc::clone(&notified);
        engine.subscribe(move |_| seen.set(seen.get() + 1));

        let mut nested = None;
        let outer = engine.mutate("outer", |engine| {
            nested = Some(engine.add(Record::new("inner", ts)));
            engine.add_record(Record::new("a", ts))
        });

        assert_eq!(
            nested,
            Some(Err(ProjectionError::Reentrant { op: "add" }))
        );
        assert_eq!(outer.map(|c| c.kind), Ok(ChangeKind::Structure));
        assert!(!engine.contains("inner"));
        assert!(engine.contains("a"));
        assert_eq!(notified.get(), 1);
        assert!(!engine.is_mutating());
    }
}
