//! Record sources: maildir folders and JSON dumps.

pub mod json;
pub mod maildir;
pub mod threading;
pub mod types;

use anyhow::Result;
use std::path::PathBuf;

use crate::projection::Record;
pub use types::{Address, MailHeader, MaildirFlags};

/// Where the viewer gets its records from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSource {
    Maildir {
        root: PathBuf,
        user_email: Option<String>,
    },
    Json(PathBuf),
}

impl RecordSource {
    /// Load every record. `progress` receives (done, total).
    pub fn load<F>(&self, progress: F) -> Result<Vec<Record>>
    where
        F: Fn(usize, usize) + Sync,
    {
        match self {
            RecordSource::Maildir { root, user_email } => {
                maildir::load_maildir(root, user_email.as_deref(), progress)
            }
            RecordSource::Json(path) => {
                let records = json::load_records(path)?;
                progress(records.len(), records.len());
                Ok(records)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RecordSource::Maildir { root, .. } => format!("maildir {}", root.display()),
            RecordSource::Json(path) => format!("records {}", path.display()),
        }
    }
}
