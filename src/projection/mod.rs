//! Incremental grouped and threaded projection of a record set.
//!
//! The engine keeps a flat row sequence (headers, thread rows, standalone
//! records, expanded thread children) consistent under single-record
//! mutations without rebuilding it.

mod bulk;
mod engine;
mod grouping;
mod header;
mod index;
mod record;
mod row;
mod sorting;
mod thread;
mod validate;


pub use engine::{ChangeKind, ProjectionChange, ProjectionEngine};
pub use grouping::{GroupKey, GroupKeyStrategy, GroupingMode, UNKNOWN_CORRESPONDENT, date_label};
pub use header::GroupHeader;
pub use index::PositionIndex;
pub use record::Record;
pub use row::{Row, RowKind, RowView};
pub use sorting::{SortDirection, SortKey, SortStrategy};
pub use thread::ThreadAggregate;
