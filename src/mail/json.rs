use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::projection::Record;

/// Load records from a JSON array file.
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let records: Vec<Record> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse records from {}", path.display()))?;
    info!(path = %path.display(), records = records.len(), "loaded records");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"unique_id": "a", "timestamp": "2026-03-12T09:00:00Z", "conversation_id": "x"}},
                {{"unique_id": "b", "timestamp": "2026-03-12T10:00:00Z", "is_read": true,
                  "correspondent_name": "Ada"}}
            ]"#
        )
        .unwrap();

        let records = load_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].conversation(), Some("x"));
        assert!(records[1].is_read);
        assert_eq!(records[1].correspondent_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_load_records_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = load_records(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse records"));
    }
}
