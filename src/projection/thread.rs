use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::record::Record;
use super::sorting::{SortKey, SortStrategy};

/// Records sharing one conversation id, shown as a single expandable row.
///
/// Membership changes only update the aggregate itself; placing its rows in
/// the projection is the engine's job.
#[derive(Debug, Clone)]
pub struct ThreadAggregate {
    conversation_id: String,
    members: HashMap<String, Record>,
    latest_timestamp: DateTime<Utc>,
    representative: String,
    all_read: bool,
    is_expanded: bool,
    pub is_selected: bool,
}

impl ThreadAggregate {
    pub fn new(conversation_id: impl Into<String>, records: impl IntoIterator<Item = Record>) -> Self {
        let mut thread = Self {
            conversation_id: conversation_id.into(),
            members: HashMap::new(),
            latest_timestamp: DateTime::<Utc>::MIN_UTC,
            representative: String::new(),
            all_read: true,
            is_expanded: false,
            is_selected: false,
        };
        for record in records {
            thread.members.insert(record.unique_id.clone(), record);
        }
        thread.recompute();
        thread
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Adds a member, replacing (and returning) any member with the same id.
    pub fn add_member(&mut self, record: Record) -> Option<Record> {
        let previous = self.members.insert(record.unique_id.clone(), record);
        self.recompute();
        previous
    }

    pub fn remove_member(&mut self, unique_id: &str) -> Option<Record> {
        let removed = self.members.remove(unique_id);
        if removed.is_some() {
            self.recompute();
        }
        removed
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.members.contains_key(unique_id)
    }

    pub fn member_by_id(&self, unique_id: &str) -> Option<&Record> {
        self.members.get(unique_id)
    }

    pub(crate) fn member_by_id_mut(&mut self, unique_id: &str) -> Option<&mut Record> {
        self.members.get_mut(unique_id)
    }

    pub fn members(&self) -> impl Iterator<Item = &Record> {
        self.members.values()
    }

    pub(crate) fn into_members(self) -> impl Iterator<Item = Record> {
        self.members.into_values()
    }

    pub fn latest_timestamp(&self) -> DateTime<Utc> {
        self.latest_timestamp
    }

    pub fn all_read(&self) -> bool {
        self.all_read
    }

    pub fn unread_count(&self) -> usize {
        self.members.values().filter(|r| !r.is_read).count()
    }

    pub fn is_expanded(&self) -> bool {
        self.is_expanded
    }

    pub fn set_expanded(&mut self, expanded: bool) {
        self.is_expanded = expanded;
    }

    pub fn toggle_expanded(&mut self) -> bool {
        self.is_expanded = !self.is_expanded;
        self.is_expanded
    }

    /// The newest member; it decides the thread's group and sort slot.
    pub fn representative(&self) -> Option<&Record> {
        self.members.get(&self.representative)
    }

    /// Sort key of the thread row: latest timestamp, representative id.
    pub fn sort_key(&self) -> SortKey<'_> {
        SortKey {
            timestamp: self.latest_timestamp,
            unique_id: &self.representative,
        }
    }

    /// Whether `record` would take over as representative if added.
    pub fn would_lead(&self, record: &Record) -> bool {
        self.members.is_empty()
            || (record.timestamp, record.unique_id.as_str())
                > (self.latest_timestamp, self.representative.as_str())
    }

    pub fn sorted_members(&self, strategy: &SortStrategy) -> Vec<&Record> {
        let mut members: Vec<&Record> = self.members.values().collect();
        members.sort_by(|a, b| strategy.compare_records(a, b));
        members
    }

    fn recompute(&mut self) {
        let lead = self
            .members
            .values()
            .max_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.unique_id.cmp(&b.unique_id))
            });
        match lead {
            Some(record) => {
                self.latest_timestamp = record.timestamp;
                self.representative = record.unique_id.clone();
            }
            None => {
                self.latest_timestamp = DateTime::<Utc>::MIN_UTC;
                self.representative.clear();
            }
        }
        self.all_read = self.members.values().all(|r| r.is_read);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::sorting::SortDirection;
    use chrono::TimeZone;

    fn rec(id: &str, secs: i64, read: bool) -> Record {
        Record::new(id, Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap())
            .with_conversation("conv")
            .read(read)
    }

    #[test]
    fn test_aggregates_follow_membership() {
        let mut thread = ThreadAggregate::new("conv", [rec("a", 10, true), rec("b", 30, false)]);
        assert_eq!(thread.member_count(), 2);
        assert_eq!(thread.representative().map(|r| r.unique_id.as_str()), Some("b"));
        assert!(!thread.all_read());
        assert_eq!(thread.unread_count(), 1);

        thread.add_member(rec("c", 20, true));
        assert_eq!(thread.latest_timestamp(), rec("b", 30, true).timestamp);

        thread.remove_member("b");
        assert!(thread.all_read());
        assert_eq!(thread.representative().map(|r| r.unique_id.as_str()), Some("c"));
        assert!(thread.remove_member("missing").is_none());
    }

    #[test]
    fn test_replace_member_and_lead() {
        let mut thread = ThreadAggregate::new("conv", [rec("a", 10, false), rec("b", 20, false)]);
        assert!(thread.would_lead(&rec("c", 25, false)));
        assert!(!thread.would_lead(&rec("c", 15, false)));
        // same timestamp, larger id takes the lead
        assert!(thread.would_lead(&rec("z", 20, false)));

        let old = thread.add_member(rec("a", 10, true));
        assert!(old.is_some_and(|r| !r.is_read));
        assert_eq!(thread.member_count(), 2);
        assert_eq!(thread.unread_count(), 1);
    }

    #[test]
    fn test_sorted_members_and_expansion() {
        let mut thread = ThreadAggregate::new(
            "conv",
            [rec("a", 30, false), rec("b", 10, false), rec("c", 20, false)],
        );
        let asc = SortStrategy::new(SortDirection::Ascending);
        let ids: Vec<_> = thread
            .sorted_members(&asc)
            .iter()
            .map(|r| r.unique_id.clone())
            .collect();
        assert_eq!(ids, ["b", "c", "a"]);

        assert!(!thread.is_expanded());
        assert!(thread.toggle_expanded());
        assert!(!thread.toggle_expanded());
    }
}
