//! Cursor implementations and row sinks for the paging layer

pub mod schema;
pub mod sink;
pub mod sources;

// Re-exports
pub use sink::{ArrowCellConverter, BatchSink, CellConverter};
pub use sources::{MemoryCursor, PagedSession, RowFetcher, SqliteCursor};
