use serde::{Deserialize, Serialize};

mod cursor;
mod query;
mod sink;

pub use cursor::{CursorSession, RemoteCursor, SessionId};
pub use query::{Query, QueryParam, SortKey};
pub use sink::{RowSink, SharedSink};

/// One materialized slice of rows returned by a single fetch
pub type Batch = arrow::record_batch::RecordBatch;

/// How a batch is merged into a row sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillMode {
    /// Replace the sink's contents with the batch
    Overwrite,
    /// Add the batch's rows after the existing ones
    Append,
}

/// A single cell as seen by the consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Transient placeholder for a row that is not materialized yet
    Pending,
}

impl CellValue {
    /// Whether this is the not-yet-loaded placeholder
    pub fn is_pending(&self) -> bool {
        matches!(self, CellValue::Pending)
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Pending => write!(f, "…"),
        }
    }
}

/// An inclusive range of absolute row indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowRange {
    pub first: usize,
    pub last: usize,
}

impl RowRange {
    /// Create a range, swapping the bounds if they arrive reversed
    pub fn new(first: usize, last: usize) -> Self {
        if first <= last {
            Self { first, last }
        } else {
            Self { first: last, last: first }
        }
    }

    pub fn contains(&self, row: usize) -> bool {
        row >= self.first && row <= self.last
    }

    /// Number of rows covered (always at least one)
    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }

    /// Clamp into `[0, total - 1]`, `None` when there are no rows at all
    pub fn clamp_to(&self, total: usize) -> Option<Self> {
        if total == 0 {
            return None;
        }
        let max = total - 1;
        Some(Self::new(self.first.min(max), self.last.min(max)))
    }
}
