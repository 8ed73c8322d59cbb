use std::cmp::Ordering;
use std::collections::HashMap;

use super::grouping::GroupKey;
use super::sorting::SortStrategy;

/// Cache of where each group header currently sits in the projection.
#[derive(Debug, Clone, Default)]
pub struct PositionIndex {
    offsets: HashMap<GroupKey, usize>,
}

impl PositionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset_of(&self, key: &GroupKey) -> Option<usize> {
        self.offsets.get(key).copied()
    }

    pub fn set_offset(&mut self, key: GroupKey, pos: usize) {
        self.offsets.insert(key, pos);
    }

    pub fn remove(&mut self, key: &GroupKey) -> Option<usize> {
        self.offsets.remove(key)
    }

    /// Moves every cached offset strictly greater than `pivot` by `delta`.
    pub fn shift_after(&mut self, pivot: usize, delta: isize) {
        self.shift(delta, |offset| offset > pivot);
    }

    /// Moves every cached offset at or past the splice position `at` by
    /// `delta`.
    ///
    /// Must run once per splice with the exact number of rows inserted
    /// (positive) or removed (negative), after any header being removed has
    /// been dropped from the index.
    pub fn shift_from(&mut self, at: usize, delta: isize) {
        self.shift(delta, |offset| offset >= at);
    }

    fn shift(&mut self, delta: isize, moves: impl Fn(usize) -> bool) {
        if delta == 0 {
            return;
        }
        for offset in self.offsets.values_mut() {
            if moves(*offset) {
                debug_assert!(offset.checked_add_signed(delta).is_some());
                *offset = offset.saturating_add_signed(delta);
            }
        }
    }

    /// Row at which a new header for `key` belongs: the offset of the first
    /// group that sorts after it, or `end` when none does.
    pub fn insertion_offset(&self, key: &GroupKey, strategy: &SortStrategy, end: usize) -> usize {
        self.offsets
            .iter()
            .filter(|(other, _)| strategy.compare_groups(other, key) == Ordering::Greater)
            .map(|(_, &offset)| offset)
            .min()
            .unwrap_or(end)
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn clear(&mut self) {
        self.offsets.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, usize)> {
        self.offsets.iter().map(|(k, &v)| (k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::sorting::SortDirection;

    fn key(name: &str) -> GroupKey {
        GroupKey::Correspondent(name.to_string())
    }

    #[test]
    fn test_shift_after_skips_pivot() {
        let mut index = PositionIndex::new();
        index.set_offset(key("a"), 0);
        index.set_offset(key("b"), 3);
        index.set_offset(key("c"), 7);

        // rows inserted after row 3 leave the header at 3 alone
        index.shift_after(3, 2);
        assert_eq!(index.offset_of(&key("a")), Some(0));
        assert_eq!(index.offset_of(&key("b")), Some(3));
        assert_eq!(index.offset_of(&key("c")), Some(9));

        index.shift_after(0, -1);
        assert_eq!(index.offset_of(&key("a")), Some(0));
        assert_eq!(index.offset_of(&key("b")), Some(2));
    }

    #[test]
    fn test_shift_from() {
        let mut index = PositionIndex::new();
        index.set_offset(key("a"), 0);
        index.set_offset(key("b"), 3);
        index.set_offset(key("c"), 7);

        // two rows inserted at row 3: b and c move
        index.shift_from(3, 2);
        assert_eq!(index.offset_of(&key("a")), Some(0));
        assert_eq!(index.offset_of(&key("b")), Some(5));
        assert_eq!(index.offset_of(&key("c")), Some(9));

        // group b's header row goes away
        let pos = index.remove(&key("b")).unwrap();
        index.shift_from(pos, -1);
        assert_eq!(index.offset_of(&key("c")), Some(8));
        assert_eq!(index.len(), 2);

        // a splice at the very top moves everything
        index.shift_from(0, 1);
        assert_eq!(index.offset_of(&key("a")), Some(1));
        assert_eq!(index.offset_of(&key("c")), Some(9));
    }

    #[test]
    fn test_insertion_offset() {
        let mut index = PositionIndex::new();
        let asc = SortStrategy::new(SortDirection::Ascending);
        assert_eq!(index.insertion_offset(&key("m"), &asc, 0), 0);

        index.set_offset(key("b"), 0);
        index.set_offset(key("k"), 4);
        index.set_offset(key("x"), 6);
        assert_eq!(index.insertion_offset(&key("a"), &asc, 9), 0);
        assert_eq!(index.insertion_offset(&key("m"), &asc, 9), 6);
        assert_eq!(index.insertion_offset(&key("z"), &asc, 9), 9);

        let mut index = PositionIndex::new();
        let desc = SortStrategy::new(SortDirection::Descending);
        index.set_offset(key("x"), 0);
        index.set_offset(key("k"), 2);
        index.set_offset(key("b"), 5);
        assert_eq!(index.insertion_offset(&key("m"), &desc, 9), 2);
        assert_eq!(index.insertion_offset(&key("a"), &desc, 9), 9);
    }
}
