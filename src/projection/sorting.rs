use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::grouping::GroupKey;
use super::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ascending",
            SortDirection::Descending => "descending",
        }
    }
}

/// Position of a top-level item (or a thread child) inside its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey<'a> {
    pub timestamp: DateTime<Utc>,
    pub unique_id: &'a str,
}

impl<'a> SortKey<'a> {
    pub fn of(record: &'a Record) -> Self {
        Self {
            timestamp: record.timestamp,
            unique_id: &record.unique_id,
        }
    }

    fn base_cmp(&self, other: &SortKey<'_>) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.unique_id.cmp(other.unique_id))
    }
}

/// Total order for members of a group, thread children and groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortStrategy {
    direction: SortDirection,
}

impl SortStrategy {
    pub fn new(direction: SortDirection) -> Self {
        Self { direction }
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    pub fn set_direction(&mut self, direction: SortDirection) {
        self.direction = direction;
    }

    pub fn compare(&self, a: &SortKey<'_>, b: &SortKey<'_>) -> Ordering {
        self.direction.apply(a.base_cmp(b))
    }

    pub fn compare_records(&self, a: &Record, b: &Record) -> Ordering {
        self.compare(&SortKey::of(a), &SortKey::of(b))
    }

    /// Date groups order by date, correspondent groups case-insensitively
    /// with the exact name as tie-break.
    pub fn compare_groups(&self, a: &GroupKey, b: &GroupKey) -> Ordering {
        let base = match (a, b) {
            (GroupKey::Date(x), GroupKey::Date(y)) => x.cmp(y),
            (GroupKey::Correspondent(x), GroupKey::Correspondent(y)) => x
                .to_lowercase()
                .cmp(&y.to_lowercase())
                .then_with(|| x.cmp(y)),
            (GroupKey::Date(_), GroupKey::Correspondent(_)) => Ordering::Less,
            (GroupKey::Correspondent(_), GroupKey::Date(_)) => Ordering::Greater,
        };
        self.direction.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_member_order_and_tiebreak() {
        let asc = SortStrategy::new(SortDirection::Ascending);
        let a = Record::new("a", at(10));
        let b = Record::new("b", at(20));
        let b2 = Record::new("b2", at(20));
        assert_eq!(asc.compare_records(&a, &b), Ordering::Less);
        assert_eq!(asc.compare_records(&b, &b2), Ordering::Less);

        let desc = SortStrategy::new(SortDirection::Descending);
        assert_eq!(desc.compare_records(&a, &b), Ordering::Greater);
        assert_eq!(desc.compare_records(&b, &b2), Ordering::Greater);
        assert_eq!(desc.compare_records(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_group_order() {
        let asc = SortStrategy::new(SortDirection::Ascending);
        let d1 = GroupKey::Date(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        let d2 = GroupKey::Date(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(asc.compare_groups(&d1, &d2), Ordering::Less);

        let bob = GroupKey::Correspondent("bob".into());
        let alice = GroupKey::Correspondent("Alice".into());
        let alice_lower = GroupKey::Correspondent("alice".into());
        assert_eq!(asc.compare_groups(&alice, &bob), Ordering::Less);
        assert_ne!(asc.compare_groups(&alice, &alice_lower), Ordering::Equal);

        let desc = SortStrategy::new(SortDirection::Descending);
        assert_eq!(desc.compare_groups(&d1, &d2), Ordering::Greater);
        assert_eq!(desc.compare_groups(&alice, &bob), Ordering::Greater);
    }
}
