use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::projection::Record;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Address {
    pub name: Option<String>,
    pub addr: String,
}

impl Address {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.addr.clone())
    }
}

/// Flags encoded in a maildir filename suffix (`:2,FRS`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MaildirFlags {
    pub seen: bool,
    pub replied: bool,
    pub flagged: bool,
    pub draft: bool,
    pub trashed: bool,
}

/// Headers of one maildir message that the viewer cares about.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailHeader {
    pub path: PathBuf,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub subject: Option<String>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub flags: MaildirFlags,
    #[serde(default)]
    pub is_sent: bool,
}

impl MailHeader {
    /// The other party: the recipient for sent mail, the sender otherwise.
    pub fn correspondent(&self) -> Option<&Address> {
        if self.is_sent {
            self.to.as_ref().or(self.from.as_ref())
        } else {
            self.from.as_ref()
        }
    }

    /// The file path is the process-local identity, the Message-ID the
    /// remote one.
    pub fn into_record(self, conversation_id: Option<String>) -> Record {
        let unique_id = self.path.to_string_lossy().into_owned();
        let correspondent_name = self.correspondent().map(Address::display_name);
        Record {
            id: self.message_id.unwrap_or_else(|| unique_id.clone()),
            unique_id,
            conversation_id,
            timestamp: self.date,
            correspondent_name,
            subject: self.subject,
            is_read: self.flags.seen,
            is_flagged: self.flags.flagged,
            is_draft: self.flags.draft,
            is_selected: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn header() -> MailHeader {
        MailHeader {
            path: PathBuf::from("/mail/cur/1:2,S"),
            message_id: Some("m1@example.com".into()),
            in_reply_to: None,
            references: Vec::new(),
            from: Some(Address {
                name: Some("Ada".into()),
                addr: "ada@example.com".into(),
            }),
            to: Some(Address {
                name: None,
                addr: "me@example.com".into(),
            }),
            subject: Some("hello".into()),
            date: Utc.with_ymd_and_hms(2026, 3, 12, 9, 0, 0).unwrap(),
            flags: MaildirFlags {
                seen: true,
                ..Default::default()
            },
            is_sent: false,
        }
    }

    #[test]
    fn test_into_record() {
        let record = header().into_record(Some("root@example.com".into()));
        assert_eq!(record.unique_id, "/mail/cur/1:2,S");
        assert_eq!(record.id, "m1@example.com");
        assert_eq!(record.conversation(), Some("root@example.com"));
        assert_eq!(record.correspondent_name.as_deref(), Some("Ada"));
        assert!(record.is_read);
        assert!(!record.is_flagged);
    }

    #[test]
    fn test_sent_mail_uses_recipient() {
        let mut sent = header();
        sent.is_sent = true;
        let record = sent.into_record(None);
        assert_eq!(record.correspondent_name.as_deref(), Some("me@example.com"));
    }
}
