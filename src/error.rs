use crate::projection::GroupKey;

/// Errors returned by projection mutators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    #[error("{op} rejected: another mutation is still in progress")]
    Reentrant { op: &'static str },
}

/// A broken structural invariant of the flat projection.
///
/// These indicate a bug in the engine, never bad input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("header for {key} sits at row {actual} but the index says {expected:?}")]
    OffsetDrift {
        key: GroupKey,
        expected: Option<usize>,
        actual: usize,
    },

    #[error("index has {indexed} groups, header table has {headers}, projection has {rows}")]
    GroupTableMismatch {
        indexed: usize,
        headers: usize,
        rows: usize,
    },

    #[error("header for {0} has no items")]
    EmptyGroup(GroupKey),

    #[error("header for {key} reports {reported} {what}, projection holds {actual}")]
    CountMismatch {
        key: GroupKey,
        what: &'static str,
        reported: usize,
        actual: usize,
    },

    #[error("thread {0} has fewer than two members")]
    UndersizedThread(String),

    #[error("thread {0} children do not match its expansion state")]
    ChildrenMismatch(String),

    #[error("row {0} appears before any header")]
    HeaderlessRow(usize),

    #[error("row {row} belongs to {expected} but sits under {actual}")]
    WrongGroup {
        row: usize,
        expected: GroupKey,
        actual: GroupKey,
    },

    #[error("rows {0} and {1} are out of order")]
    OrderViolation(usize, usize),

    #[error("record {0} appears more than once")]
    DuplicateRow(String),

    #[error("record {0} is tracked but has no footprint")]
    Orphan(String),

    #[error("row {0} references a record or thread the engine does not hold")]
    DanglingRow(usize),

    #[error("lookup table entry for {0} is stale")]
    StaleLookup(String),
}
