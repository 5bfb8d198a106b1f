//! Page arithmetic shared by every cursor implementation
//!
//! A cursor only has to know how to count its rows and fetch a slice by
//! offset; [`PagedSession`] turns that into the navigation contract.

use rp_core::{Batch, CursorError, CursorSession, SessionId};

/// Backend half of a session: row counting and offset/limit fetches
pub trait RowFetcher: Send {
    /// Total rows produced by the bound query
    fn count(&mut self) -> Result<usize, CursorError>;

    /// Fetch at most `limit` rows starting at `offset`
    fn fetch(&mut self, offset: usize, limit: usize) -> Result<Batch, CursorError>;

    /// False once the underlying connection has gone away
    fn is_alive(&self) -> bool {
        true
    }

    /// Release backend resources
    fn release(&mut self) {}
}

/// A session over any [`RowFetcher`]
pub struct PagedSession<F: RowFetcher> {
    id: SessionId,
    fetcher: F,
    rows_per_page: usize,
    current_page: usize,
    total_rows: usize,
    closed: bool,
}

impl<F: RowFetcher> PagedSession<F> {
    /// Count the rows and get ready to fetch; nothing is fetched yet
    pub fn open(mut fetcher: F, fetch_size: usize) -> Result<Self, CursorError> {
        let total_rows = fetcher.count()?;
        let id = SessionId::new_v4();
        tracing::debug!(session = %id, total_rows, fetch_size, "session opened");

        Ok(Self {
            id,
            fetcher,
            rows_per_page: fetch_size.max(1),
            current_page: 0,
            total_rows,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<(), CursorError> {
        if self.is_closed() {
            Err(CursorError::Closed)
        } else {
            Ok(())
        }
    }

    fn fetch_page(&mut self, page: usize) -> Result<Option<Batch>, CursorError> {
        self.ensure_open()?;
        let page = page.min(self.max_page_index());
        let batch = self.fetcher.fetch(page * self.rows_per_page, self.rows_per_page)?;
        self.current_page = page;
        tracing::trace!(session = %self.id, page, rows = batch.num_rows(), "page fetched");
        Ok(Some(batch))
    }
}

impl<F: RowFetcher> CursorSession for PagedSession<F> {
    fn id(&self) -> SessionId {
        self.id
    }

    fn first_page(&mut self) -> Result<Option<Batch>, CursorError> {
        self.fetch_page(0)
    }

    fn next_page(&mut self) -> Result<Option<Batch>, CursorError> {
        self.ensure_open()?;
        if self.current_page >= self.max_page_index() {
            return Ok(None);
        }
        self.fetch_page(self.current_page + 1)
    }

    fn previous_page(&mut self) -> Result<Option<Batch>, CursorError> {
        self.ensure_open()?;
        if self.current_page == 0 {
            return Ok(None);
        }
        self.fetch_page(self.current_page - 1)
    }

    fn last_page(&mut self) -> Result<Option<Batch>, CursorError> {
        self.fetch_page(self.max_page_index())
    }

    fn goto_page(&mut self, page: i64) -> Result<Option<Batch>, CursorError> {
        let clamped = page.clamp(0, self.max_page_index() as i64) as usize;
        self.fetch_page(clamped)
    }

    fn goto_row(&mut self, row: usize) -> Result<Option<Batch>, CursorError> {
        self.ensure_open()?;
        if self.total_rows == 0 {
            return Ok(None);
        }
        let row = row.min(self.total_rows - 1);
        let batch = self.fetcher.fetch(row, self.rows_per_page)?;
        self.current_page = row / self.rows_per_page;
        tracing::trace!(session = %self.id, row, rows = batch.num_rows(), "rows fetched");
        Ok(Some(batch))
    }

    fn set_fetch_size(&mut self, rows: usize) {
        self.rows_per_page = rows.max(1);
        self.current_page = self.current_page.min(self.max_page_index());
    }

    fn rows_per_page(&self) -> usize {
        self.rows_per_page
    }

    fn current_page_index(&self) -> usize {
        self.current_page
    }

    fn max_page_index(&self) -> usize {
        if self.total_rows == 0 {
            0
        } else {
            (self.total_rows - 1) / self.rows_per_page
        }
    }

    fn total_rows(&self) -> usize {
        self.total_rows
    }

    fn is_closed(&self) -> bool {
        self.closed || !self.fetcher.is_alive()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.fetcher.release();
            tracing::debug!(session = %self.id, "session closed");
        }
    }
}

impl<F: RowFetcher> Drop for PagedSession<F> {
    fn drop(&mut self) {
        self.close();
    }
}
