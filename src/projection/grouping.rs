use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use super::record::Record;

/// Label used when a record carries no correspondent.
pub const UNKNOWN_CORRESPONDENT: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupingMode {
    #[default]
    Date,
    Correspondent,
}

impl GroupingMode {
    pub fn next(self) -> Self {
        match self {
            GroupingMode::Date => GroupingMode::Correspondent,
            GroupingMode::Correspondent => GroupingMode::Date,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GroupingMode::Date => "date",
            GroupingMode::Correspondent => "correspondent",
        }
    }
}

/// Identity of one partition of the projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Date(NaiveDate),
    Correspondent(String),
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Date(date) => write!(f, "{}", date),
            GroupKey::Correspondent(name) => write!(f, "{:?}", name),
        }
    }
}

/// Maps records to the group they are listed under.
///
/// `today` is an explicit input so labels stay deterministic; the key itself
/// never depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupKeyStrategy {
    mode: GroupingMode,
    offset: FixedOffset,
    today: NaiveDate,
}

impl GroupKeyStrategy {
    pub fn new(mode: GroupingMode, offset: FixedOffset, today: NaiveDate) -> Self {
        Self {
            mode,
            offset,
            today,
        }
    }

    /// Strategy for the machine's local offset and current date.
    pub fn local(mode: GroupingMode) -> Self {
        let now = Local::now();
        Self::new(mode, now.offset().fix(), now.date_naive())
    }

    pub fn mode(&self) -> GroupingMode {
        self.mode
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn set_mode(&mut self, mode: GroupingMode) {
        self.mode = mode;
    }

    pub fn set_today(&mut self, today: NaiveDate) {
        self.today = today;
    }

    /// Calendar date of `timestamp` in the configured offset.
    pub fn date_of(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        timestamp.with_timezone(&self.offset).date_naive()
    }

    /// Group key for a record. Threads pass their representative.
    pub fn key_of(&self, record: &Record) -> GroupKey {
        match self.mode {
            GroupingMode::Date => GroupKey::Date(self.date_of(record.timestamp)),
            GroupingMode::Correspondent => GroupKey::Correspondent(correspondent_key(record)),
        }
    }

    pub fn label_of(&self, key: &GroupKey) -> String {
        match key {
            GroupKey::Date(date) => date_label(*date, self.today),
            GroupKey::Correspondent(name) => name.clone(),
        }
    }

    pub fn classify(&self, record: &Record) -> (GroupKey, String) {
        let key = self.key_of(record);
        let label = self.label_of(&key);
        (key, label)
    }
}

fn correspondent_key(record: &Record) -> String {
    record
        .correspondent_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(UNKNOWN_CORRESPONDENT)
        .to_string()
}

/// Human label for a date bucket relative to `today`.
pub fn date_label(date: NaiveDate, today: NaiveDate) -> String {
    let age = (today - date).num_days();
    match age {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => date.format("%A").to_string(),
        _ if date.year() == today.year() => date.format("%B %-d").to_string(),
        _ => date.format("%B %-d, %Y").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_label_precedence() {
        let today = day(2026, 3, 12); // Thursday
        assert_eq!(date_label(today, today), "Today");
        assert_eq!(date_label(day(2026, 3, 11), today), "Yesterday");
        assert_eq!(date_label(day(2026, 3, 9), today), "Monday");
        assert_eq!(date_label(day(2026, 3, 6), today), "Friday");
        assert_eq!(date_label(day(2026, 3, 5), today), "March 5");
        assert_eq!(date_label(day(2026, 1, 1), today), "January 1");
        assert_eq!(date_label(day(2025, 12, 31), today), "December 31, 2025");
        assert_eq!(date_label(day(2026, 3, 20), today), "March 20");
    }

    #[test]
    fn test_date_key_uses_offset() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let strategy = GroupKeyStrategy::new(GroupingMode::Date, offset, day(2026, 3, 12));
        // 02:00 UTC on the 12th is still the 11th at UTC-5
        let rec = Record::new("a", Utc.with_ymd_and_hms(2026, 3, 12, 2, 0, 0).unwrap());
        let (key, label) = strategy.classify(&rec);
        assert_eq!(key, GroupKey::Date(day(2026, 3, 11)));
        assert_eq!(label, "Yesterday");
    }

    #[test]
    fn test_correspondent_key() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let strategy =
            GroupKeyStrategy::new(GroupingMode::Correspondent, utc, day(2026, 3, 12));
        let ts = Utc.with_ymd_and_hms(2026, 3, 12, 2, 0, 0).unwrap();
        let named = Record::new("a", ts).with_correspondent(" Ada ");
        assert_eq!(
            strategy.classify(&named),
            (GroupKey::Correspondent("Ada".into()), "Ada".to_string())
        );
        let blank = Record::new("b", ts).with_correspondent("");
        assert_eq!(
            strategy.key_of(&blank),
            GroupKey::Correspondent(UNKNOWN_CORRESPONDENT.into())
        );
        assert_eq!(
            strategy.key_of(&Record::new("c", ts)),
            GroupKey::Correspondent(UNKNOWN_CORRESPONDENT.into())
        );
    }
}
