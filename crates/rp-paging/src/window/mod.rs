//! Windowed row cache for free-scrolling consumers
//!
//! Only the rows the consumer currently shows are materialized. Misses return
//! [`CellValue::Pending`] and schedule a debounced load; loads and row counts
//! run on a single background worker, one at a time, always against the
//! latest requested range.

mod state;
mod worker;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rp_core::{
    CellValue, ChangeNotifier, DataChange, PagingContext, PagingError, Query, RemoteCursor,
    ResizeDebouncer, RowRange, SharedSink, SortKey, Viewport,
};
use tokio::sync::mpsc;

pub use state::{CachePhase, Window};

use state::CacheState;
use worker::Shared;

pub struct WindowCache {
    shared: Arc<Shared>,
    debouncer: ResizeDebouncer,
}

impl WindowCache {
    /// Create a cache and start its worker thread
    pub fn new(
        cursor: Arc<dyn RemoteCursor>,
        sink: SharedSink,
        viewport: Weak<dyn Viewport>,
        context: &PagingContext,
    ) -> Result<Self, PagingError> {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(CacheState::new()),
            session: Mutex::new(None),
            cursor,
            sink,
            viewport,
            notifier: ChangeNotifier::new(context.dispatcher.clone()),
            count_fetch_size: context.settings.count_fetch_size.max(1),
            wake: Mutex::new(Some(wake_tx)),
        });

        let worker_shared = shared.clone();
        std::thread::Builder::new()
            .name(context.settings.worker_name.clone())
            .spawn(move || worker::run(worker_shared, wake_rx))
            .map_err(|e| PagingError::Worker(e.to_string()))?;

        let debouncer = ResizeDebouncer::new(context.settings.debounce, context.runtime.clone());
        let weak_shared = Arc::downgrade(&shared);
        debouncer.set_action(Arc::new(move || {
            if let Some(shared) = weak_shared.upgrade() {
                on_settle(&shared);
            }
        }));

        Ok(Self { shared, debouncer })
    }

    /// Subscribe listeners and register the error sink here
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.shared.notifier
    }

    /// Install a new query. `projection` picks the columns to keep, by index.
    /// A query without its own ordering keeps the current sort key.
    pub fn set_query(&self, query: Query, projection: Option<Vec<usize>>) {
        let initialized = {
            let mut state = self.shared.state.lock();
            let query = match query.sort() {
                Some(_) => query,
                None => query.with_sort(state.sort),
            };
            state.sort = query.sort();
            state.query = Some(query);
            state.projection = projection;
            self.reset(&mut state)
        };
        self.debouncer.cancel();
        self.shared.try_close_session();

        if initialized {
            self.shared.kick();
            self.shared.notifier.notify_changed(DataChange::Full);
        }
    }

    /// Change the sort order. The window and the row count start over, and the
    /// visible rows reload as soon as the new count lands.
    pub fn set_sort_key(&self, sort: Option<SortKey>) {
        {
            let mut state = self.shared.state.lock();
            if state.sort == sort {
                return;
            }
            let Some(query) = state.query.as_ref().map(|q| q.with_sort(sort)) else {
                state.sort = sort;
                return;
            };
            tracing::debug!(?sort, "sort key changed; invalidating window");
            state.sort = sort;
            state.query = Some(query);
            self.reset(&mut state);
            state.want_count = true;
            state.reload_after_count = true;
        }
        self.shared.try_close_session();
        self.shared.notifier.notify_changed(DataChange::Full);
        self.shared.kick();
        self.debouncer.cancel();
    }

    /// Explicit retry: lifts a suspension and re-runs the count and the load
    pub fn refresh(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.query.is_none() || state.closed {
                return;
            }
            self.reset(&mut state);
            state.want_count = true;
            state.reload_after_count = true;
        }
        self.shared.try_close_session();
        self.shared.notifier.notify_changed(DataChange::Full);
        self.shared.kick();
        self.debouncer.cancel();
    }

    /// Forget the window, the count and the sink contents; returns whether a
    /// row count was ever asked for
    fn reset(&self, state: &mut CacheState) -> bool {
        state.invalidate();
        state.suspended = false;
        state.phase = CachePhase::Stale;
        if state.initialized {
            state.want_count = true;
        } else {
            state.phase = CachePhase::Uninitialized;
        }
        self.shared.sink.write().clear();
        state.initialized
    }

    /// Row count for the consumer, `0` until the asynchronous count resolves
    pub fn row_count(&self) -> usize {
        let mut state = self.shared.state.lock();
        state.initialized = true;
        if let Some(total) = state.total_rows {
            return total;
        }
        if state.query.is_some() && !state.suspended && !state.closed {
            state.phase = CachePhase::Counting;
            state.want_count = true;
            drop(state);
            self.shared.kick();
        }
        0
    }

    /// Cell value, or [`CellValue::Pending`] while the row is not materialized
    pub fn value_at(&self, row: usize, col: usize) -> CellValue {
        let mut state = self.shared.state.lock();
        if let Some(loaded) = state.window.loaded.filter(|loaded| loaded.contains(row)) {
            return self
                .shared
                .sink
                .read()
                .value_at(row - loaded.first, col)
                .unwrap_or(CellValue::Null);
        }

        let requested = state.window.requested.map(|r| r.contains(row)).unwrap_or(false);
        let restart = !requested
            && state.total_rows.is_some()
            && state.requested_from_viewport(&self.shared.viewport, Some(row))
            && !state.suspended
            && !state.closed;
        drop(state);

        if restart {
            self.debouncer.restart();
        }
        CellValue::Pending
    }

    /// Scroll or resize event from the consumer
    pub fn on_viewport_changed(&self) {
        let restart = {
            let mut state = self.shared.state.lock();
            state.total_rows.is_some()
                && state.requested_from_viewport(&self.shared.viewport, None)
                && !state.suspended
                && !state.closed
        };
        if restart {
            self.debouncer.restart();
        }
    }

    /// Close the session and stop the worker
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.debouncer.cancel();
        self.shared.try_close_session();
        self.shared.wake.lock().take();
        tracing::debug!("window cache closed");
    }

    pub fn window(&self) -> Window {
        self.shared.state.lock().window
    }

    pub fn phase(&self) -> CachePhase {
        self.shared.state.lock().phase
    }

    /// Total rows, `None` until counted
    pub fn total_rows(&self) -> Option<usize> {
        self.shared.state.lock().total_rows
    }

    pub fn sort_key(&self) -> Option<SortKey> {
        self.shared.state.lock().sort
    }

    /// Whether automatic loads are paused after a failure
    pub fn is_suspended(&self) -> bool {
        self.shared.state.lock().suspended
    }
}

impl Drop for WindowCache {
    fn drop(&mut self) {
        self.close();
    }
}

/// Debounce expiry: hand the latest requested range to the worker
fn on_settle(shared: &Shared) {
    {
        let mut state = shared.state.lock();
        if state.closed || state.suspended || state.window.requested.is_none() {
            return;
        }
        state.want_load = true;
    }
    shared.kick();
}

impl CacheState {
    /// Point the requested range at the viewport's visible span, shifted to
    /// include `anchor`. Returns whether the requested range changed.
    fn requested_from_viewport(&mut self, viewport: &Weak<dyn Viewport>, anchor: Option<usize>) -> bool {
        let span = self
            .total_rows
            .and_then(|total| visible_span(viewport, anchor, total));
        let changed = span.is_some() && span != self.window.requested;
        if changed {
            self.window.requested = span;
        }
        changed
    }
}

fn visible_span(viewport: &Weak<dyn Viewport>, anchor: Option<usize>, total: usize) -> Option<RowRange> {
    let (mut first, mut last) = match viewport.upgrade() {
        Some(viewport) => {
            let first = viewport.first_visible_row();
            (first, viewport.last_visible_row().max(first))
        }
        None => {
            let row = anchor?;
            (row, row)
        }
    };

    if let Some(row) = anchor {
        if row < first {
            last -= first - row;
            first = row;
        } else if row > last {
            first += row - last;
            last = row;
        }
    }
    RowRange::new(first, last).clamp_to(total)
}
