//! Remote cursor contract
//!
//! The paging layer only drives this interface; connection management,
//! dialect handling and result decoding belong to the implementation.

use super::{Batch, Query};
use crate::error::CursorError;

/// Identifier attached to a session for log correlation
pub type SessionId = uuid::Uuid;

/// Factory for paged sessions over a data source
pub trait RemoteCursor: Send + Sync {
    /// Open a session for `query`, fetching `fetch_size` rows per navigation call
    fn open(&self, query: &Query, fetch_size: usize) -> Result<Box<dyn CursorSession>, CursorError>;

    /// Get the cursor name for logs
    fn cursor_name(&self) -> &str;
}

/// One open cursor bound to a query.
///
/// Navigation calls return `Ok(None)` when there is nothing to move to
/// (already on the first/last page, empty result).
pub trait CursorSession: Send {
    fn id(&self) -> SessionId;

    fn first_page(&mut self) -> Result<Option<Batch>, CursorError>;

    fn next_page(&mut self) -> Result<Option<Batch>, CursorError>;

    fn previous_page(&mut self) -> Result<Option<Batch>, CursorError>;

    fn last_page(&mut self) -> Result<Option<Batch>, CursorError>;

    /// Move to page `page`, clamped into `[0, max_page_index]`
    fn goto_page(&mut self, page: i64) -> Result<Option<Batch>, CursorError>;

    /// Fetch `rows_per_page` rows starting at absolute row `row`
    fn goto_row(&mut self, row: usize) -> Result<Option<Batch>, CursorError>;

    /// Change the fetch size without fetching
    fn set_fetch_size(&mut self, rows: usize);

    /// Change the fetch size and re-fetch the current page at the new size
    fn set_rows_per_page(&mut self, rows: usize) -> Result<Option<Batch>, CursorError> {
        let page = self.current_page_index();
        self.set_fetch_size(rows);
        self.goto_page(page as i64)
    }

    fn rows_per_page(&self) -> usize;

    fn current_page_index(&self) -> usize;

    fn max_page_index(&self) -> usize;

    fn total_rows(&self) -> usize;

    fn is_closed(&self) -> bool;

    fn close(&mut self);
}
