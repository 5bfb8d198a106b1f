//! Page-at-a-time controller
//!
//! One controller per bound consumer. Fetches run synchronously on the
//! calling (consumer) thread; only the geometry settle timer runs elsewhere,
//! and its action is marshalled back through the dispatcher.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rp_core::{
    Batch, ChangeNotifier, CursorError, CursorSession, DataChange, FillMode, PagingContext,
    PagingError, Query, RemoteCursor, ResizeDebouncer, RowsPerPage, SharedSink, Viewport,
};

use crate::session::{close_session, open_session};

/// Page size used when the size is dynamic and the viewport cannot tell us
pub const FALLBACK_ROWS_PER_PAGE: usize = 20;

type Outcome = Result<Option<DataChange>, PagingError>;

/// Controller state, guarded by a single mutex
struct PageState {
    cursor: Arc<dyn RemoteCursor>,
    sink: SharedSink,
    viewport: Weak<dyn Viewport>,
    session: Option<Box<dyn CursorSession>>,
    last_query: Option<Query>,
    current_page: usize,
    rows_per_page: RowsPerPage,
    suspended: bool,
}

impl PageState {
    fn effective_rows_per_page(&self) -> usize {
        match self.rows_per_page {
            RowsPerPage::Fixed(n) => n.max(1),
            RowsPerPage::Dynamic => self
                .viewport
                .upgrade()
                .and_then(|viewport| viewport.row_capacity())
                .or_else(|| self.session.as_ref().map(|s| s.rows_per_page()))
                .unwrap_or(FALLBACK_ROWS_PER_PAGE),
        }
    }

    fn session_is_open(&self) -> bool {
        self.session.as_ref().map(|s| !s.is_closed()).unwrap_or(false)
    }

    fn merge(&mut self, batch: Option<Batch>) -> Option<DataChange> {
        let batch = batch?;
        if let Some(session) = &self.session {
            self.current_page = session.current_page_index();
        }
        self.sink.write().add_batch(batch, FillMode::Overwrite);
        Some(DataChange::Full)
    }

    /// Open a fresh session for `query` and show `page`
    fn install(&mut self, query: Query, page: usize) -> Outcome {
        close_session(&mut self.session);
        self.last_query = Some(query.clone());

        let rows = self.effective_rows_per_page();
        let mut session = open_session(self.cursor.as_ref(), &query, rows)?;
        let page = page.min(session.max_page_index());
        let batch = if page == 0 {
            session.first_page()
        } else {
            session.goto_page(page as i64)
        };
        self.session = Some(session);

        match batch {
            Ok(Some(batch)) => Ok(self.merge(Some(batch))),
            Ok(None) => {
                self.current_page = 0;
                self.sink.write().clear();
                Ok(Some(DataChange::Full))
            }
            Err(e) => Err(PagingError::Fetch(e)),
        }
    }

    /// Re-issue the last query at the current page
    fn refresh(&mut self) -> Outcome {
        let query = self.last_query.clone().ok_or(PagingError::NoQuery)?;
        let page = self.current_page;
        self.install(query, page)
    }

    /// Self-heal once from a session that reported itself closed
    fn recover(&mut self) -> Result<(), PagingError> {
        tracing::warn!(page = self.current_page, "session closed underneath controller; refreshing");
        match self.refresh() {
            Ok(_) => Ok(()),
            Err(PagingError::Fetch(e)) | Err(PagingError::SessionOpen(e)) => {
                Err(PagingError::SessionOpen(e))
            }
            Err(e) => Err(e),
        }
    }

    fn navigate<F>(&mut self, op: F) -> Outcome
    where
        F: Fn(&mut dyn CursorSession) -> Result<Option<Batch>, CursorError>,
    {
        if self.last_query.is_none() {
            return Err(PagingError::NoQuery);
        }

        let mut recovered = false;
        if !self.session_is_open() {
            self.recover()?;
            recovered = true;
        }

        loop {
            let session = self.session.as_mut().ok_or(PagingError::StaleSession)?;
            match op(session.as_mut()) {
                Ok(batch) => {
                    let change = self.merge(batch);
                    // The recovery refresh already changed the sink
                    return Ok(change.or(recovered.then_some(DataChange::Full)));
                }
                Err(CursorError::Closed) if !recovered => {
                    self.recover()?;
                    recovered = true;
                }
                Err(e) => return Err(PagingError::Fetch(e)),
            }
        }
    }

    fn resize_to(&mut self, rows: usize) -> Outcome {
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        if session.rows_per_page() == rows {
            return Ok(None);
        }

        tracing::debug!(from = session.rows_per_page(), to = rows, "page size changed");
        self.navigate(|session| session.set_rows_per_page(rows))
    }

    /// Debounced geometry settle
    fn on_settle(&mut self) -> Outcome {
        if self.suspended || self.rows_per_page != RowsPerPage::Dynamic || !self.session_is_open() {
            return Ok(None);
        }
        let Some(rows) = self.viewport.upgrade().and_then(|v| v.row_capacity()) else {
            return Ok(None);
        };
        self.resize_to(rows)
    }
}

fn publish(notifier: &ChangeNotifier, outcome: Outcome) -> Result<(), PagingError> {
    match outcome {
        Ok(Some(change)) => {
            notifier.notify_changed(change);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(error) => {
            tracing::warn!(%error, "page fetch failed");
            notifier.report_error(error.clone());
            Err(error)
        }
    }
}

/// Page-at-a-time navigation over a remote cursor
pub struct PageController {
    state: Arc<Mutex<PageState>>,
    notifier: ChangeNotifier,
    debouncer: ResizeDebouncer,
}

impl PageController {
    pub fn new(
        cursor: Arc<dyn RemoteCursor>,
        sink: SharedSink,
        viewport: Weak<dyn Viewport>,
        context: &PagingContext,
    ) -> Self {
        let state = Arc::new(Mutex::new(PageState {
            cursor,
            sink,
            viewport,
            session: None,
            last_query: None,
            current_page: 0,
            rows_per_page: context.settings.rows_per_page,
            suspended: false,
        }));
        let notifier = ChangeNotifier::new(context.dispatcher.clone());
        let debouncer = ResizeDebouncer::new(context.settings.debounce, context.runtime.clone());

        // Settle fires on the runtime; the recompute runs on the consumer thread
        let weak_state = Arc::downgrade(&state);
        let settle_notifier = notifier.clone();
        let dispatcher = context.dispatcher.clone();
        debouncer.set_action(Arc::new(move || {
            let weak_state = weak_state.clone();
            let notifier = settle_notifier.clone();
            dispatcher.dispatch(move || {
                let Some(state) = weak_state.upgrade() else {
                    return;
                };
                let outcome = {
                    let mut state = state.lock();
                    let outcome = state.on_settle();
                    if outcome.is_err() {
                        state.suspended = true;
                    }
                    outcome
                };
                let _ = publish(&notifier, outcome);
            });
        }));

        Self {
            state,
            notifier,
            debouncer,
        }
    }

    /// Subscribe listeners and register the error sink here
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Run an explicit consumer request; explicit calls lift a suspension
    fn run<F>(&self, f: F) -> Result<(), PagingError>
    where
        F: FnOnce(&mut PageState) -> Outcome,
    {
        let outcome = {
            let mut state = self.state.lock();
            state.suspended = false;
            let outcome = f(&mut state);
            state.suspended = outcome.is_err();
            outcome
        };
        publish(&self.notifier, outcome)
    }

    /// Install a new query and show `show_page` (clamped to the last page)
    pub fn change_query(&self, query: Query, show_page: usize) -> Result<(), PagingError> {
        self.run(|state| state.install(query, show_page))
    }

    pub fn next_page(&self) -> Result<(), PagingError> {
        self.run(|state| state.navigate(|session| session.next_page()))
    }

    pub fn previous_page(&self) -> Result<(), PagingError> {
        self.run(|state| state.navigate(|session| session.previous_page()))
    }

    pub fn first_page(&self) -> Result<(), PagingError> {
        self.run(|state| state.navigate(|session| session.first_page()))
    }

    pub fn last_page(&self) -> Result<(), PagingError> {
        self.run(|state| state.navigate(|session| session.last_page()))
    }

    /// Jump to `page`; the session clamps it into range
    pub fn goto_page(&self, page: i64) -> Result<(), PagingError> {
        self.run(|state| state.navigate(|session| session.goto_page(page)))
    }

    /// Re-issue the last query at the current page
    pub fn refresh(&self) -> Result<(), PagingError> {
        self.run(|state| state.refresh())
    }

    /// Change the page size policy, re-fetching when the effective size moves
    pub fn set_rows_per_page(&self, rows: RowsPerPage) -> Result<(), PagingError> {
        self.run(|state| {
            state.rows_per_page = rows;
            let effective = state.effective_rows_per_page();
            state.resize_to(effective)
        })
    }

    /// Geometry changed; the page size is recomputed once it settles
    pub fn on_geometry_changed(&self) {
        self.debouncer.restart();
    }

    /// The consumer became visible
    pub fn on_shown(&self) {
        let outcome = {
            let mut state = self.state.lock();
            if state.suspended || state.last_query.is_none() || state.session_is_open() {
                return;
            }
            let outcome = state.refresh();
            state.suspended = outcome.is_err();
            outcome
        };
        let _ = publish(&self.notifier, outcome);
    }

    /// The consumer was hidden: release the session, keep the position
    pub fn on_hidden(&self) {
        self.debouncer.cancel();
        let mut state = self.state.lock();
        close_session(&mut state.session);
        tracing::debug!(page = state.current_page, "consumer hidden; session released");
    }

    pub fn current_page_index(&self) -> usize {
        self.state.lock().current_page
    }

    pub fn max_page_index(&self) -> usize {
        let state = self.state.lock();
        state.session.as_ref().map(|s| s.max_page_index()).unwrap_or(0)
    }

    /// Total rows of the current query, `None` before any session was opened
    pub fn total_rows(&self) -> Option<usize> {
        let state = self.state.lock();
        state.session.as_ref().map(|s| s.total_rows())
    }

    pub fn rows_per_page(&self) -> RowsPerPage {
        self.state.lock().rows_per_page
    }

    /// The page size that would be used for the next fetch
    pub fn effective_rows_per_page(&self) -> usize {
        self.state.lock().effective_rows_per_page()
    }

    pub fn is_session_open(&self) -> bool {
        self.state.lock().session_is_open()
    }

    pub fn last_query(&self) -> Option<Query> {
        self.state.lock().last_query.clone()
    }

    /// Whether automatic requests are paused after a failure
    pub fn is_suspended(&self) -> bool {
        self.state.lock().suspended
    }
}

impl Drop for PageController {
    fn drop(&mut self) {
        self.debouncer.cancel();
        close_session(&mut self.state.lock().session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use parking_lot::RwLock;
    use rp_core::{CellValue, RowSink};
    use rp_data::{BatchSink, SqliteCursor};

    use crate::test_support::{error_recorder, recorder, Harness, TracedCursor, TestViewport};

    fn controller(
        harness: &Harness,
        cursor: Arc<dyn RemoteCursor>,
        viewport: &Arc<TestViewport>,
        rows: RowsPerPage,
    ) -> (PageController, Arc<RwLock<BatchSink>>) {
        let mut context = harness.context(30);
        context.settings.rows_per_page = rows;
        let (sink, shared) = crate::test_support::sink();
        let viewport: Weak<dyn Viewport> = Arc::downgrade(viewport) as Weak<dyn Viewport>;
        (PageController::new(cursor, shared, viewport, &context), sink)
    }

    fn first_id(sink: &RwLock<BatchSink>) -> Option<CellValue> {
        sink.read().value_at(0, 0)
    }

    #[test]
    fn test_fifty_seven_rows_in_pages_of_twenty() {
        let harness = Harness::new();
        let cursor = TracedCursor::new(57);
        let viewport = TestViewport::new(0, 19, 400.0);
        let (controller, sink) = controller(&harness, cursor.clone(), &viewport, RowsPerPage::Fixed(20));
        let (listener, changes) = recorder();
        controller.notifier().subscribe(&listener);

        controller.change_query(Query::new("numbers"), 0).unwrap();
        assert_eq!(controller.max_page_index(), 2);
        assert_eq!(controller.total_rows(), Some(57));

        controller.next_page().unwrap();
        controller.next_page().unwrap();
        assert_eq!(controller.current_page_index(), 2);
        assert_eq!(sink.read().row_count(), 17);
        assert_eq!(first_id(&sink), Some(CellValue::Int(40)));
        assert_eq!(sink.read().value_at(16, 0), Some(CellValue::Int(56)));

        // Already on the last page
        controller.next_page().unwrap();
        assert_eq!(controller.current_page_index(), 2);
        assert_eq!(sink.read().row_count(), 17);
        assert_eq!(*changes.lock(), vec![DataChange::Full; 3]);
    }

    #[test]
    fn test_navigation_stays_in_bounds() {
        let harness = Harness::new();
        let cursor = TracedCursor::new(57);
        let viewport = TestViewport::new(0, 19, 400.0);
        let (controller, sink) = controller(&harness, cursor, &viewport, RowsPerPage::Fixed(20));

        controller.change_query(Query::new("numbers"), 9).unwrap();
        assert_eq!(controller.current_page_index(), 2);

        for (requested, expected) in [(-5, 0), (1, 1), (99, 2)] {
            controller.goto_page(requested).unwrap();
            assert_eq!(controller.current_page_index(), expected);
        }

        controller.first_page().unwrap();
        controller.previous_page().unwrap();
        assert_eq!(controller.current_page_index(), 0);
        assert_eq!(first_id(&sink), Some(CellValue::Int(0)));

        controller.last_page().unwrap();
        assert_eq!(first_id(&sink), Some(CellValue::Int(40)));
    }

    #[test]
    fn test_dynamic_page_size_follows_settled_geometry() {
        let harness = Harness::new();
        let cursor = TracedCursor::new(57);
        let viewport = TestViewport::new(0, 9, 200.0);
        let (controller, sink) = controller(&harness, cursor.clone(), &viewport, RowsPerPage::Dynamic);

        controller.change_query(Query::new("numbers"), 0).unwrap();
        assert_eq!(controller.effective_rows_per_page(), 10);
        assert_eq!(controller.max_page_index(), 5);
        controller.goto_page(2).unwrap();
        assert_eq!(first_id(&sink), Some(CellValue::Int(20)));
        let fetches = cursor.traffic.page_fetches.load(Ordering::SeqCst);

        viewport.resize(400.0);
        for _ in 0..3 {
            controller.on_geometry_changed();
        }
        assert!(harness.wait_until(|| controller.max_page_index() == 2));
        assert_eq!(controller.current_page_index(), 2);
        assert_eq!(sink.read().row_count(), 17);
        assert_eq!(first_id(&sink), Some(CellValue::Int(40)));
        assert_eq!(cursor.traffic.page_fetches.load(Ordering::SeqCst), fetches + 1);

        // Same geometry again: nothing to do
        controller.on_geometry_changed();
        harness.settle(120);
        assert_eq!(cursor.traffic.page_fetches.load(Ordering::SeqCst), fetches + 1);
        assert_eq!(cursor.traffic.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hidden_consumer_releases_session() {
        let harness = Harness::new();
        let cursor = TracedCursor::new(57);
        let viewport = TestViewport::new(0, 19, 400.0);
        let (controller, sink) = controller(&harness, cursor.clone(), &viewport, RowsPerPage::Fixed(20));

        controller.change_query(Query::new("numbers"), 2).unwrap();
        controller.on_hidden();
        assert!(!controller.is_session_open());
        assert_eq!(cursor.traffic.closes.load(Ordering::SeqCst), 1);
        assert_eq!(controller.current_page_index(), 2);

        controller.on_shown();
        assert!(controller.is_session_open());
        assert_eq!(cursor.traffic.opens.load(Ordering::SeqCst), 2);
        assert_eq!(controller.current_page_index(), 2);
        assert_eq!(first_id(&sink), Some(CellValue::Int(40)));

        // Already open: shown again is a no-op
        controller.on_shown();
        assert_eq!(cursor.traffic.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_closed_session_recovers_once() {
        let harness = Harness::new();
        let cursor = TracedCursor::new(57);
        let viewport = TestViewport::new(0, 19, 400.0);
        let (controller, sink) = controller(&harness, cursor.clone(), &viewport, RowsPerPage::Fixed(20));
        let (errors, seen) = error_recorder();
        controller.notifier().set_error_sink(&errors);

        controller.change_query(Query::new("numbers"), 0).unwrap();
        cursor.inner.disconnect_all();
        assert!(!controller.is_session_open());

        controller.next_page().unwrap();
        assert_eq!(controller.current_page_index(), 1);
        assert_eq!(first_id(&sink), Some(CellValue::Int(20)));
        assert_eq!(cursor.traffic.opens.load(Ordering::SeqCst), 2);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_open_failure_reaches_error_sink_and_keeps_rows() {
        let harness = Harness::new();
        let cursor = TracedCursor::new(57);
        let viewport = TestViewport::new(0, 19, 400.0);
        let (controller, sink) = controller(&harness, cursor.clone(), &viewport, RowsPerPage::Fixed(20));
        let (errors, seen) = error_recorder();
        controller.notifier().set_error_sink(&errors);

        controller.change_query(Query::new("numbers"), 0).unwrap();
        cursor.traffic.fail_open.store(true, Ordering::SeqCst);
        cursor.inner.disconnect_all();

        let result = controller.next_page();
        assert!(matches!(result, Err(PagingError::SessionOpen(_))));
        assert_eq!(seen.lock().len(), 1);
        assert!(matches!(seen.lock()[0], PagingError::SessionOpen(_)));
        assert!(controller.is_suspended());
        assert_eq!(sink.read().row_count(), 20);
        assert_eq!(first_id(&sink), Some(CellValue::Int(0)));

        // Suspended: becoming visible does not retry on its own
        controller.on_shown();
        assert_eq!(seen.lock().len(), 1);

        cursor.traffic.fail_open.store(false, Ordering::SeqCst);
        controller.next_page().unwrap();
        assert!(!controller.is_suspended());
        assert_eq!(controller.current_page_index(), 1);
    }

    #[test]
    fn test_fetch_failure_is_returned() {
        let harness = Harness::new();
        let cursor = TracedCursor::new(57);
        let viewport = TestViewport::new(0, 19, 400.0);
        let (controller, _sink) = controller(&harness, cursor.clone(), &viewport, RowsPerPage::Fixed(20));

        controller.change_query(Query::new("numbers"), 0).unwrap();
        cursor.traffic.fail_fetch.store(true, Ordering::SeqCst);
        assert!(matches!(controller.next_page(), Err(PagingError::Fetch(_))));
        assert_eq!(controller.current_page_index(), 0);

        assert!(matches!(
            controller.change_query(Query::new("numbers"), 0),
            Err(PagingError::Fetch(_))
        ));
    }

    #[test]
    fn test_navigation_without_query() {
        let harness = Harness::new();
        let cursor = TracedCursor::new(57);
        let viewport = TestViewport::new(0, 19, 400.0);
        let (controller, _sink) = controller(&harness, cursor, &viewport, RowsPerPage::Fixed(20));

        assert!(matches!(controller.next_page(), Err(PagingError::NoQuery)));
        assert!(matches!(controller.refresh(), Err(PagingError::NoQuery)));
    }

    #[test]
    fn test_set_rows_per_page_keeps_position() {
        let harness = Harness::new();
        let cursor = TracedCursor::new(57);
        let viewport = TestViewport::new(0, 19, 400.0);
        let (controller, sink) = controller(&harness, cursor, &viewport, RowsPerPage::Fixed(10));

        controller.change_query(Query::new("numbers"), 5).unwrap();
        assert_eq!(first_id(&sink), Some(CellValue::Int(50)));

        controller.set_rows_per_page(RowsPerPage::Fixed(25)).unwrap();
        assert_eq!(controller.rows_per_page(), RowsPerPage::Fixed(25));
        assert_eq!(controller.current_page_index(), 2);
        assert_eq!(sink.read().row_count(), 7);
        assert_eq!(first_id(&sink), Some(CellValue::Int(50)));

        // Switching to dynamic picks up the viewport capacity of 20 rows
        controller.set_rows_per_page(RowsPerPage::Dynamic).unwrap();
        assert_eq!(controller.effective_rows_per_page(), 20);
        assert_eq!(controller.max_page_index(), 2);
    }

    #[test]
    fn test_pages_through_sqlite_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT);")
            .unwrap();
        for id in 0..57 {
            conn.execute(
                "INSERT INTO items (id, label) VALUES (?1, ?2)",
                rusqlite::params![id, format!("item-{}", id)],
            )
            .unwrap();
        }
        drop(conn);

        let harness = Harness::new();
        let viewport = TestViewport::new(0, 19, 400.0);
        let cursor: Arc<dyn RemoteCursor> = Arc::new(SqliteCursor::new(&path));
        let (controller, sink) = controller(&harness, cursor, &viewport, RowsPerPage::Fixed(20));

        controller
            .change_query(Query::new("SELECT id, label FROM items"), 0)
            .unwrap();
        controller.last_page().unwrap();
        assert_eq!(controller.current_page_index(), 2);
        assert_eq!(sink.read().row_count(), 17);
        assert_eq!(sink.read().value_at(0, 1), Some(CellValue::Text("item-40".into())));
    }
}
