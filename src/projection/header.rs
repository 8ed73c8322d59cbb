use super::grouping::GroupKey;

/// Derived metadata for one group of the projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupHeader {
    key: GroupKey,
    label: String,
    item_count: usize,
    unread_count: usize,
    // projection rows between this header and the next one
    pub(crate) span: usize,
}

impl GroupHeader {
    pub(crate) fn new(key: GroupKey, label: String) -> Self {
        Self {
            key,
            label,
            item_count: 0,
            unread_count: 0,
            span: 0,
        }
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Records in the group, counting every thread member.
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    pub(crate) fn set_label(&mut self, label: String) {
        self.label = label;
    }

    pub(crate) fn add(&mut self, items: usize, unread: usize) {
        self.item_count += items;
        self.unread_count += unread;
    }

    pub(crate) fn subtract(&mut self, items: usize, unread: usize) {
        debug_assert!(items <= self.item_count && unread <= self.unread_count);
        self.item_count = self.item_count.saturating_sub(items);
        self.unread_count = self.unread_count.saturating_sub(unread);
    }

    /// Applies a read-state flip of one member.
    pub(crate) fn mark_read(&mut self, was_read: bool, is_read: bool) {
        match (was_read, is_read) {
            (false, true) => self.unread_count = self.unread_count.saturating_sub(1),
            (true, false) => self.unread_count += 1,
            _ => {}
        }
    }
}
