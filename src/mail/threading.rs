use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::types::MailHeader;
use crate::projection::Record;

/// Conversation id for every header: the Message-ID at the root of its
/// reply chain, or `None` for a message that has neither a parent nor an id.
pub fn conversation_ids(headers: &[MailHeader]) -> Vec<Option<String>> {
    if headers.is_empty() {
        return Vec::new();
    }

    // 1. message_id -> index
    let id_to_idx: HashMap<&str, usize> = headers
        .par_iter()
        .enumerate()
        .filter_map(|(i, h)| h.message_id.as_deref().map(|mid| (mid, i)))
        .collect();

    // 2. parent links, skipping self references
    let parent: Vec<Option<usize>> = headers
        .par_iter()
        .enumerate()
        .map(|(i, h)| {
            if let Some(reply_to) = h.in_reply_to.as_deref() {
                if let Some(&p) = id_to_idx.get(reply_to) {
                    if p != i {
                        return Some(p);
                    }
                }
            }
            // fall back to the last resolvable reference
            h.references
                .iter()
                .rev()
                .filter_map(|r| id_to_idx.get(r.as_str()).copied())
                .find(|&p| p != i)
        })
        .collect();

    // 3. roots
    let roots: Vec<usize> = (0..headers.len())
        .into_par_iter()
        .map(|i| find_root(i, &parent))
        .collect();

    let conversations: HashSet<usize> = roots.iter().copied().collect();
    debug!(
        messages = headers.len(),
        conversations = conversations.len(),
        "assigned conversations"
    );

    roots
        .into_iter()
        .map(|root| headers[root].message_id.clone())
        .collect()
}

/// Walks parent links to the top of a chain. Messages on a reference cycle
/// all resolve to the smallest index on that cycle.
fn find_root(start: usize, parent: &[Option<usize>]) -> usize {
    let mut visited = HashSet::new();
    let mut current = start;
    while let Some(p) = parent[current] {
        if !visited.insert(current) {
            return cycle_min(current, parent);
        }
        current = p;
    }
    current
}

fn cycle_min(on_cycle: usize, parent: &[Option<usize>]) -> usize {
    let mut min = on_cycle;
    let mut current = parent[on_cycle];
    while let Some(next) = current {
        if next == on_cycle {
            break;
        }
        min = min.min(next);
        current = parent[next];
    }
    min
}

/// Turns scanned headers into engine records with conversation ids.
pub fn thread_records(headers: Vec<MailHeader>) -> Vec<Record> {
    let ids = conversation_ids(&headers);
    headers
        .into_par_iter()
        .zip(ids)
        .map(|(header, conversation_id)| header.into_record(conversation_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::types::MaildirFlags;
    use chrono::Utc;
    use std::path::PathBuf;

    fn msg(id: &str, reply_to: Option<&str>, refs: &[&str]) -> MailHeader {
        MailHeader {
            path: PathBuf::from(format!("/mail/cur/{id}")),
            message_id: Some(id.to_string()),
            in_reply_to: reply_to.map(str::to_string),
            references: refs.iter().map(|r| r.to_string()).collect(),
            from: None,
            to: None,
            subject: None,
            date: Utc::now(),
            flags: MaildirFlags::default(),
            is_sent: false,
        }
    }

    #[test]
    fn test_reply_chain_shares_root() {
        let headers = vec![
            msg("c", Some("b"), &["a", "b"]),
            msg("a", None, &[]),
            msg("b", Some("a"), &["a"]),
            msg("z", None, &[]),
        ];
        let ids = conversation_ids(&headers);
        assert_eq!(
            ids,
            [
                Some("a".to_string()),
                Some("a".to_string()),
                Some("a".to_string()),
                Some("z".to_string())
            ]
        );
    }

    #[test]
    fn test_references_fallback_and_missing_parent() {
        // in-reply-to points outside the set; the last known reference wins
        let headers = vec![
            msg("a", None, &[]),
            msg("c", Some("gone"), &["a", "missing"]),
            msg("d", Some("d"), &[]),
        ];
        let ids = conversation_ids(&headers);
        assert_eq!(ids[1].as_deref(), Some("a"));
        assert_eq!(ids[2].as_deref(), Some("d"));
    }

    #[test]
    fn test_cycle_is_broken() {
        let headers = vec![msg("a", Some("b"), &[]), msg("b", Some("a"), &[])];
        let ids = conversation_ids(&headers);
        assert_eq!(ids, [Some("a".to_string()), Some("a".to_string())]);
    }

    #[test]
    fn test_thread_records() {
        let mut orphan = msg("x", None, &[]);
        orphan.message_id = None;
        let records = thread_records(vec![msg("a", None, &[]), msg("b", Some("a"), &[]), orphan]);
        assert_eq!(records[1].conversation(), Some("a"));
        assert_eq!(records[2].conversation(), None);
        assert_eq!(records[2].id, "/mail/cur/x");
    }
}
