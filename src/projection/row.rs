use super::grouping::GroupKey;
use super::header::GroupHeader;
use super::record::Record;
use super::thread::ThreadAggregate;

/// One element of the flat projection, stored as a handle into the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Row {
    Header(GroupKey),
    Thread(String),
    Standalone(String),
    ThreadChild {
        conversation_id: String,
        unique_id: String,
    },
}

impl Row {
    pub fn kind(&self) -> RowKind {
        match self {
            Row::Header(_) => RowKind::Header,
            Row::Thread(_) => RowKind::Thread,
            Row::Standalone(_) => RowKind::Standalone,
            Row::ThreadChild { .. } => RowKind::ThreadChild,
        }
    }
}

/// Row template selector for renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKind {
    Header,
    Thread,
    Standalone,
    ThreadChild,
}

/// A projection row resolved to the data it shows.
#[derive(Debug, Clone, Copy)]
pub enum RowView<'a> {
    Header(&'a GroupHeader),
    Thread(&'a ThreadAggregate),
    Standalone(&'a Record),
    ThreadChild {
        thread: &'a ThreadAggregate,
        record: &'a Record,
    },
}

impl<'a> RowView<'a> {
    pub fn kind(&self) -> RowKind {
        match self {
            RowView::Header(_) => RowKind::Header,
            RowView::Thread(_) => RowKind::Thread,
            RowView::Standalone(_) => RowKind::Standalone,
            RowView::ThreadChild { .. } => RowKind::ThreadChild,
        }
    }

    /// The record a row stands for; threads answer with their newest member.
    pub fn record(&self) -> Option<&'a Record> {
        match *self {
            RowView::Header(_) => None,
            RowView::Thread(thread) => thread.representative(),
            RowView::Standalone(record) => Some(record),
            RowView::ThreadChild { record, .. } => Some(record),
        }
    }
}
