use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One logical message as handed to the engine by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Remote identity. May repeat across re-syncs.
    #[serde(default)]
    pub id: String,
    /// Process-local identity; the key the engine tracks records by.
    pub unique_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub correspondent_name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_flagged: bool,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub is_selected: bool,
}

impl Record {
    pub fn new(unique_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let unique_id = unique_id.into();
        Self {
            id: unique_id.clone(),
            unique_id,
            conversation_id: None,
            timestamp,
            correspondent_name: None,
            subject: None,
            is_read: false,
            is_flagged: false,
            is_draft: false,
            is_selected: false,
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_correspondent(mut self, name: impl Into<String>) -> Self {
        self.correspondent_name = Some(name.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn read(mut self, is_read: bool) -> Self {
        self.is_read = is_read;
        self
    }

    /// Records without a unique id are ignored by every mutator.
    pub fn has_identity(&self) -> bool {
        !self.unique_id.trim().is_empty()
    }

    /// Conversation id, treating an empty string as absent.
    pub fn conversation(&self) -> Option<&str> {
        self.conversation_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn correspondent_display(&self) -> &str {
        self.correspondent_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or("(unknown)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_blank_conversation_is_absent() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let rec = Record::new("a", ts).with_conversation("  ");
        assert_eq!(rec.conversation(), None);
        assert!(rec.has_identity());
        assert!(!Record::new(" ", ts).has_identity());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let rec: Record = serde_json::from_str(
            r#"{"unique_id":"u1","timestamp":"2026-01-05T09:00:00Z","is_read":true}"#,
        )
        .unwrap();
        assert_eq!(rec.unique_id, "u1");
        assert!(rec.is_read);
        assert!(rec.conversation_id.is_none());
        assert_eq!(rec.correspondent_display(), "(unknown)");
    }
}
