use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info};

use super::engine::{Item, Location, ProjectionEngine};
use super::grouping::GroupKey;
use super::header::GroupHeader;
use super::record::Record;
use super::row::Row;
use super::sorting::SortKey;
use super::thread::ThreadAggregate;

/// A top-level item with its group and sort slot, ready to be emitted.
struct Entry {
    key: GroupKey,
    timestamp: DateTime<Utc>,
    unique_id: String,
    item: Item,
}

impl Entry {
    fn sort_key(&self) -> SortKey<'_> {
        SortKey {
            timestamp: self.timestamp,
            unique_id: &self.unique_id,
        }
    }
}

impl ProjectionEngine {
    pub(super) fn reset_state(&mut self) {
        self.standalone.clear();
        self.threads.clear();
        self.locations.clear();
        self.loose.clear();
        self.headers.clear();
        self.index.clear();
        self.rows.clear();
    }

    /// Fills the record tables. Later duplicates of a unique id replace
    /// earlier ones; conversations with two or more records become threads.
    pub(super) fn ingest(&mut self, records: impl IntoIterator<Item = Record>) {
        let mut order = Vec::new();
        let mut latest: HashMap<String, Record> = HashMap::new();
        let mut skipped = 0usize;
        for record in records {
            if !record.has_identity() {
                skipped += 1;
                continue;
            }
            let uid = record.unique_id.clone();
            if latest.insert(uid.clone(), record).is_none() {
                order.push(uid);
            }
        }
        if skipped > 0 {
            debug!(skipped, "skipped records without unique id");
        }

        let mut conversations: HashMap<String, Vec<Record>> = HashMap::new();
        for uid in order {
            let Some(record) = latest.remove(&uid) else {
                continue;
            };
            match record.conversation().map(str::to_string) {
                Some(conv) => conversations.entry(conv).or_default().push(record),
                None => self.ingest_standalone(record),
            }
        }

        for (conv, mut members) in conversations {
            if members.len() >= 2 {
                for member in &members {
                    self.locations
                        .insert(member.unique_id.clone(), Location::Thread(conv.clone()));
                }
                self.threads
                    .insert(conv.clone(), ThreadAggregate::new(conv, members));
            } else if let Some(record) = members.pop() {
                self.loose.insert(conv, record.unique_id.clone());
                self.ingest_standalone(record);
            }
        }
    }

    fn ingest_standalone(&mut self, record: Record) {
        self.locations
            .insert(record.unique_id.clone(), Location::Standalone);
        self.standalone.insert(record.unique_id.clone(), record);
    }

    /// Recomputes headers, index and rows from the record tables in one
    /// sorted pass.
    pub(super) fn rebuild(&mut self) {
        self.headers.clear();
        self.index.clear();
        self.rows.clear();

        let grouping = self.grouping;
        let sorting = self.sorting;

        let mut entries: Vec<Entry> = self
            .standalone
            .par_iter()
            .map(|(uid, record)| Entry {
                key: grouping.key_of(record),
                timestamp: record.timestamp,
                unique_id: uid.clone(),
                item: Item::Standalone(uid.clone()),
            })
            .collect();
        entries.par_extend(self.threads.par_iter().filter_map(|(conv, thread)| {
            let lead = thread.representative()?;
            Some(Entry {
                key: grouping.key_of(lead),
                timestamp: thread.latest_timestamp(),
                unique_id: lead.unique_id.clone(),
                item: Item::Thread(conv.clone()),
            })
        }));

        entries.par_sort_by(|a, b| {
            sorting
                .compare_groups(&a.key, &b.key)
                .then_with(|| sorting.compare(&a.sort_key(), &b.sort_key()))
        });

        let mut current: Option<GroupKey> = None;
        for entry in &entries {
            if current.as_ref() != Some(&entry.key) {
                self.index.set_offset(entry.key.clone(), self.rows.len());
                self.rows.push(Row::Header(entry.key.clone()));
                self.headers.insert(
                    entry.key.clone(),
                    GroupHeader::new(entry.key.clone(), grouping.label_of(&entry.key)),
                );
                current = Some(entry.key.clone());
            }
            let footprint = self.footprint(&entry.item);
            let (items, unread) = self.tally(&entry.item);
            let span = footprint.len();
            self.rows.extend(footprint);
            if let Some(header) = self.headers.get_mut(&entry.key) {
                header.add(items, unread);
                header.span += span;
            }
        }

        info!(
            records = self.locations.len(),
            threads = self.threads.len(),
            groups = self.headers.len(),
            rows = self.rows.len(),
            mode = grouping.mode().name(),
            direction = sorting.direction().name(),
            "rebuilt projection"
        );
    }
}
