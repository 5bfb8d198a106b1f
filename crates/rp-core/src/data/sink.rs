use std::sync::Arc;

use parking_lot::RwLock;

use super::{Batch, CellValue, FillMode};

/// Storage for materialized rows, owned by the consumer and filled by the core
pub trait RowSink: Send + Sync {
    /// Merge a batch according to `mode`
    fn add_batch(&mut self, batch: Batch, mode: FillMode);

    /// Drop all rows
    fn clear(&mut self);

    /// Number of rows currently held
    fn row_count(&self) -> usize;

    /// Value at a sink-relative position, `None` when out of range
    fn value_at(&self, row: usize, col: usize) -> Option<CellValue>;
}

/// Sink handle shared between the consumer and a controller
pub type SharedSink = Arc<RwLock<dyn RowSink>>;
