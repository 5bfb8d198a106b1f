//! In-memory cursor over a single record batch
//!
//! The statement text is only used as a label; sort keys are applied with
//! Arrow's sort kernels. [`MemoryCursor::disconnect_all`] simulates a lost
//! connection for every session opened so far.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arrow::compute::{sort_to_indices, take_record_batch, SortOptions};
use rp_core::{Batch, CursorError, CursorSession, Query, RemoteCursor, SortKey};

use super::paged::{PagedSession, RowFetcher};

pub struct MemoryCursor {
    name: String,
    data: Batch,
    epoch: Arc<AtomicU64>,
}

impl MemoryCursor {
    pub fn new(name: impl Into<String>, data: Batch) -> Self {
        Self {
            name: name.into(),
            data,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Mark every open session as closed, as a dropped connection would
    pub fn disconnect_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(cursor = %self.name, "all sessions disconnected");
    }

    pub fn data(&self) -> &Batch {
        &self.data
    }

    fn sorted(&self, sort: Option<SortKey>) -> Result<Batch, CursorError> {
        let Some(sort) = sort else {
            return Ok(self.data.clone());
        };
        if sort.column >= self.data.num_columns() {
            return Err(CursorError::InvalidQuery(format!(
                "sort column {} out of range ({} columns)",
                sort.column,
                self.data.num_columns()
            )));
        }

        let options = SortOptions {
            descending: sort.descending,
            nulls_first: sort.descending,
        };
        let indices = sort_to_indices(self.data.column(sort.column), Some(options), None)?;
        Ok(take_record_batch(&self.data, &indices)?)
    }
}

impl RemoteCursor for MemoryCursor {
    fn open(&self, query: &Query, fetch_size: usize) -> Result<Box<dyn CursorSession>, CursorError> {
        tracing::trace!(cursor = %self.name, statement = query.statement(), "opening memory session");
        let fetcher = MemoryFetcher {
            data: self.sorted(query.sort())?,
            opened_at: self.epoch.load(Ordering::SeqCst),
            epoch: self.epoch.clone(),
        };
        Ok(Box::new(PagedSession::open(fetcher, fetch_size)?))
    }

    fn cursor_name(&self) -> &str {
        &self.name
    }
}

struct MemoryFetcher {
    data: Batch,
    opened_at: u64,
    epoch: Arc<AtomicU64>,
}

impl RowFetcher for MemoryFetcher {
    fn count(&mut self) -> Result<usize, CursorError> {
        Ok(self.data.num_rows())
    }

    fn fetch(&mut self, offset: usize, limit: usize) -> Result<Batch, CursorError> {
        if !self.is_alive() {
            return Err(CursorError::Closed);
        }
        let total = self.data.num_rows();
        let offset = offset.min(total);
        let length = limit.min(total - offset);
        Ok(self.data.slice(offset, length))
    }

    fn is_alive(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) == self.opened_at
    }
}
