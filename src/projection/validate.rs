use std::cmp::Ordering;
use std::collections::HashSet;

use super::engine::{Location, ProjectionEngine};
use super::grouping::GroupKey;
use super::row::Row;
use super::sorting::SortKey;
use crate::error::InvariantViolation;

/// Running totals for the group currently being walked.
struct GroupTally<'a> {
    key: &'a GroupKey,
    rows: usize,
    items: usize,
    unread: usize,
}

impl ProjectionEngine {
    /// Checks every structural invariant of the projection against the
    /// record tables. O(n); meant for debug builds and tests.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let header_rows = self
            .rows
            .iter()
            .filter(|row| matches!(row, Row::Header(_)))
            .count();
        if header_rows != self.headers.len() || self.index.len() != self.headers.len() {
            return Err(InvariantViolation::GroupTableMismatch {
                indexed: self.index.len(),
                headers: self.headers.len(),
                rows: header_rows,
            });
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut group: Option<GroupTally<'_>> = None;
        let mut previous_group: Option<(usize, &GroupKey)> = None;
        let mut previous_item: Option<(usize, SortKey<'_>)> = None;

        let mut pos = 0;
        while pos < self.rows.len() {
            match &self.rows[pos] {
                Row::Header(key) => {
                    if let Some(tally) = group.take() {
                        self.close_group(tally)?;
                    }
                    let expected = self.index.offset_of(key);
                    if expected != Some(pos) {
                        return Err(InvariantViolation::OffsetDrift {
                            key: key.clone(),
                            expected,
                            actual: pos,
                        });
                    }
                    if let Some((prev_pos, prev_key)) = previous_group {
                        if self.sorting.compare_groups(prev_key, key) != Ordering::Less {
                            return Err(InvariantViolation::OrderViolation(prev_pos, pos));
                        }
                    }
                    previous_group = Some((pos, key));
                    previous_item = None;
                    group = Some(GroupTally {
                        key,
                        rows: 0,
                        items: 0,
                        unread: 0,
                    });
                    pos += 1;
                }
                Row::Standalone(uid) => {
                    let tally = group
                        .as_mut()
                        .ok_or(InvariantViolation::HeaderlessRow(pos))?;
                    let record = self
                        .standalone
                        .get(uid)
                        .ok_or(InvariantViolation::DanglingRow(pos))?;
                    if self.locations.get(uid) != Some(&Location::Standalone) {
                        return Err(InvariantViolation::StaleLookup(uid.clone()));
                    }
                    if !seen.insert(uid.as_str()) {
                        return Err(InvariantViolation::DuplicateRow(uid.clone()));
                    }
                    let key = self.grouping.key_of(record);
                    if key != *tally.key {
                        return Err(InvariantViolation::WrongGroup {
                            row: pos,
                            expected: key,
                            actual: tally.key.clone(),
                        });
                    }
                    let sort_key = SortKey::of(record);
                    self.check_order(previous_item, pos, &sort_key)?;
                    previous_item = Some((pos, sort_key));
                    tally.rows += 1;
                    tally.items += 1;
                    tally.unread += usize::from(!record.is_read);
                    pos += 1;
                }
                Row::Thread(conv) => {
                    let tally = group
                        .as_mut()
                        .ok_or(InvariantViolation::HeaderlessRow(pos))?;
                    let thread = self
                        .threads
                        .get(conv)
                        .ok_or(InvariantViolation::DanglingRow(pos))?;
                    if thread.member_count() < 2 {
                        return Err(InvariantViolation::UndersizedThread(conv.clone()));
                    }
                    let lead = thread
                        .representative()
                        .ok_or(InvariantViolation::DanglingRow(pos))?;
                    let key = self.grouping.key_of(lead);
                    if key != *tally.key {
                        return Err(InvariantViolation::WrongGroup {
                            row: pos,
                            expected: key,
                            actual: tally.key.clone(),
                        });
                    }
                    let sort_key = thread.sort_key();
                    self.check_order(previous_item, pos, &sort_key)?;
                    previous_item = Some((pos, sort_key));

                    for member in thread.members() {
                        if self.locations.get(&member.unique_id)
                            != Some(&Location::Thread(conv.clone()))
                        {
                            return Err(InvariantViolation::StaleLookup(member.unique_id.clone()));
                        }
                        if !seen.insert(member.unique_id.as_str()) {
                            return Err(InvariantViolation::DuplicateRow(member.unique_id.clone()));
                        }
                    }

                    let mut consumed = 1;
                    if thread.is_expanded() {
                        for (offset, member) in
                            thread.sorted_members(&self.sorting).iter().enumerate()
                        {
                            let expected = Row::ThreadChild {
                                conversation_id: conv.clone(),
                                unique_id: member.unique_id.clone(),
                            };
                            if self.rows.get(pos + 1 + offset) != Some(&expected) {
                                return Err(InvariantViolation::ChildrenMismatch(conv.clone()));
                            }
                        }
                        consumed += thread.member_count();
                    }
                    tally.rows += consumed;
                    tally.items += thread.member_count();
                    tally.unread += thread.unread_count();
                    pos += consumed;
                }
                Row::ThreadChild {
                    conversation_id, ..
                } => {
                    // children are consumed with their thread row
                    return Err(InvariantViolation::ChildrenMismatch(conversation_id.clone()));
                }
            }
        }
        if let Some(tally) = group.take() {
            self.close_group(tally)?;
        }

        if let Some(orphan) = self
            .locations
            .keys()
            .find(|uid| !seen.contains(uid.as_str()))
        {
            return Err(InvariantViolation::Orphan(orphan.clone()));
        }

        for (conv, uid) in &self.loose {
            let holds = self
                .standalone
                .get(uid)
                .is_some_and(|r| r.conversation() == Some(conv.as_str()));
            if !holds || self.threads.contains_key(conv) {
                return Err(InvariantViolation::StaleLookup(conv.clone()));
            }
        }
        for record in self.standalone.values() {
            if let Some(conv) = record.conversation() {
                if self.loose.get(conv) != Some(&record.unique_id) {
                    return Err(InvariantViolation::StaleLookup(conv.to_string()));
                }
            }
        }
        Ok(())
    }

    fn check_order(
        &self,
        previous: Option<(usize, SortKey<'_>)>,
        pos: usize,
        current: &SortKey<'_>,
    ) -> Result<(), InvariantViolation> {
        match previous {
            Some((prev_pos, prev)) if self.sorting.compare(&prev, current) != Ordering::Less => {
                Err(InvariantViolation::OrderViolation(prev_pos, pos))
            }
            _ => Ok(()),
        }
    }

    fn close_group(&self, tally: GroupTally<'_>) -> Result<(), InvariantViolation> {
        let Some(header) = self.headers.get(tally.key) else {
            return Err(InvariantViolation::GroupTableMismatch {
                indexed: self.index.len(),
                headers: self.headers.len(),
                rows: self.rows.len(),
            });
        };
        if tally.items == 0 {
            return Err(InvariantViolation::EmptyGroup(tally.key.clone()));
        }
        let checks = [
            ("rows", header.span, tally.rows),
            ("items", header.item_count(), tally.items),
            ("unread", header.unread_count(), tally.unread),
        ];
        for (what, reported, actual) in checks {
            if reported != actual {
                return Err(InvariantViolation::CountMismatch {
                    key: tally.key.clone(),
                    what,
                    reported,
                    actual,
                });
            }
        }
        Ok(())
    }
}
