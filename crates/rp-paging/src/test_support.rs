//! Shared fixtures for controller and cache tests

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use parking_lot::{Condvar, Mutex, RwLock};
use rp_core::{
    listener_fn, error_sink_fn, Batch, ChangeListener, ConsumerDispatcher, CursorError,
    CursorSession, DataChange, ErrorSink, PagingContext, PagingError, PagingSettings, Query,
    RemoteCursor, SessionId, SharedSink, ViewState, Viewport,
};
use rp_data::{BatchSink, MemoryCursor};

/// Runtime plus a dispatcher owned by the test thread
pub struct Harness {
    pub runtime: tokio::runtime::Runtime,
    pub dispatcher: Arc<ConsumerDispatcher>,
}

impl Harness {
    pub fn new() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        Self {
            runtime,
            dispatcher: Arc::new(ConsumerDispatcher::new()),
        }
    }

    pub fn context(&self, debounce_ms: u64) -> PagingContext {
        let settings = PagingSettings {
            debounce: Duration::from_millis(debounce_ms),
            ..PagingSettings::default()
        };
        PagingContext::new(self.runtime.handle().clone(), self.dispatcher.clone()).with_settings(settings)
    }

    /// Pump the consumer queue until `condition` holds or two seconds pass
    pub fn wait_until<F: Fn() -> bool>(&self, condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            self.dispatcher.run_pending();
            if condition() {
                return true;
            }
            if Instant::now() > deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Pump the consumer queue for a fixed time
    pub fn settle(&self, millis: u64) {
        let deadline = Instant::now() + Duration::from_millis(millis);
        while Instant::now() < deadline {
            self.dispatcher.run_pending();
            std::thread::sleep(Duration::from_millis(5));
        }
        self.dispatcher.run_pending();
    }
}

/// Viewport with settable geometry; rows are 20 pixels high
pub struct TestViewport {
    first: AtomicUsize,
    last: AtomicUsize,
    available: AtomicU32,
    pub captures: AtomicUsize,
    pub restores: AtomicUsize,
}

impl TestViewport {
    pub fn new(first: usize, last: usize, available: f32) -> Arc<Self> {
        Arc::new(Self {
            first: AtomicUsize::new(first),
            last: AtomicUsize::new(last),
            available: AtomicU32::new(available.to_bits()),
            captures: AtomicUsize::new(0),
            restores: AtomicUsize::new(0),
        })
    }

    pub fn scroll_to(&self, first: usize, last: usize) {
        self.first.store(first, Ordering::SeqCst);
        self.last.store(last, Ordering::SeqCst);
    }

    pub fn resize(&self, available: f32) {
        self.available.store(available.to_bits(), Ordering::SeqCst);
    }
}

impl Viewport for TestViewport {
    fn first_visible_row(&self) -> usize {
        self.first.load(Ordering::SeqCst)
    }

    fn last_visible_row(&self) -> usize {
        self.last.load(Ordering::SeqCst)
    }

    fn available_extent(&self) -> f32 {
        f32::from_bits(self.available.load(Ordering::SeqCst))
    }

    fn unit_extent(&self) -> f32 {
        20.0
    }

    fn capture_view_state(&self) -> Option<ViewState> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Some(ViewState {
            selected_rows: vec![self.first_visible_row()],
            scroll_offset: self.first_visible_row() as f32 * 20.0,
        })
    }

    fn restore_view_state(&self, _state: ViewState) {
        self.restores.fetch_add(1, Ordering::SeqCst);
    }
}

/// `id` 0..rows and `label` "row-<id>"
pub fn numbers(rows: usize) -> Batch {
    let ids: Vec<i64> = (0..rows as i64).collect();
    let labels: Vec<String> = ids.iter().map(|id| format!("row-{}", id)).collect();
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("label", DataType::Utf8, false),
    ]));
    Batch::try_new(
        schema,
        vec![Arc::new(Int64Array::from(ids)), Arc::new(StringArray::from(labels))],
    )
    .unwrap()
}

pub fn sink() -> (Arc<RwLock<BatchSink>>, SharedSink) {
    let sink = Arc::new(RwLock::new(BatchSink::new()));
    let shared: SharedSink = sink.clone();
    (sink, shared)
}

/// Observations and fault switches shared by a traced cursor and its sessions
#[derive(Default)]
pub struct Traffic {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub page_fetches: AtomicUsize,
    /// `(first row, fetch size)` of every `goto_row`
    pub row_fetches: Mutex<Vec<(usize, usize)>>,
    pub fail_open: AtomicBool,
    pub fail_fetch: AtomicBool,
    /// Rows past this index vanish from row fetches, as if the table shrank
    pub row_limit: Mutex<Option<usize>>,
    /// Fetches currently parked at the gate
    pub parked: AtomicUsize,
    gate: Mutex<bool>,
    gate_opened: Condvar,
}

impl Traffic {
    /// Park every row fetch until [`open_gate`](Self::open_gate)
    pub fn close_gate(&self) {
        *self.gate.lock() = true;
    }

    pub fn open_gate(&self) {
        *self.gate.lock() = false;
        self.gate_opened.notify_all();
    }

    pub fn row_fetches(&self) -> Vec<(usize, usize)> {
        self.row_fetches.lock().clone()
    }

    fn pass_gate(&self) {
        let mut closed = self.gate.lock();
        if *closed {
            self.parked.fetch_add(1, Ordering::SeqCst);
            while *closed {
                self.gate_opened.wait(&mut closed);
            }
            self.parked.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn check_fetch(&self) -> Result<(), CursorError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            Err(CursorError::Other("injected fetch failure".into()))
        } else {
            Ok(())
        }
    }
}

/// [`MemoryCursor`] wrapper that records traffic and injects faults
pub struct TracedCursor {
    pub inner: MemoryCursor,
    pub traffic: Arc<Traffic>,
}

impl TracedCursor {
    pub fn new(rows: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCursor::new("numbers", numbers(rows)),
            traffic: Arc::new(Traffic::default()),
        })
    }
}

impl RemoteCursor for TracedCursor {
    fn open(&self, query: &Query, fetch_size: usize) -> Result<Box<dyn CursorSession>, CursorError> {
        if self.traffic.fail_open.load(Ordering::SeqCst) {
            return Err(CursorError::Other("injected open failure".into()));
        }
        let inner = self.inner.open(query, fetch_size)?;
        self.traffic.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TracedSession {
            inner,
            traffic: self.traffic.clone(),
            closed: false,
        }))
    }

    fn cursor_name(&self) -> &str {
        self.inner.cursor_name()
    }
}

struct TracedSession {
    inner: Box<dyn CursorSession>,
    traffic: Arc<Traffic>,
    closed: bool,
}

impl TracedSession {
    fn page<F>(&mut self, op: F) -> Result<Option<Batch>, CursorError>
    where
        F: FnOnce(&mut dyn CursorSession) -> Result<Option<Batch>, CursorError>,
    {
        self.traffic.check_fetch()?;
        let batch = op(self.inner.as_mut())?;
        if batch.is_some() {
            self.traffic.page_fetches.fetch_add(1, Ordering::SeqCst);
        }
        Ok(batch)
    }
}

impl CursorSession for TracedSession {
    fn id(&self) -> SessionId {
        self.inner.id()
    }

    fn first_page(&mut self) -> Result<Option<Batch>, CursorError> {
        self.page(|s| s.first_page())
    }

    fn next_page(&mut self) -> Result<Option<Batch>, CursorError> {
        self.page(|s| s.next_page())
    }

    fn previous_page(&mut self) -> Result<Option<Batch>, CursorError> {
        self.page(|s| s.previous_page())
    }

    fn last_page(&mut self) -> Result<Option<Batch>, CursorError> {
        self.page(|s| s.last_page())
    }

    fn goto_page(&mut self, page: i64) -> Result<Option<Batch>, CursorError> {
        self.page(|s| s.goto_page(page))
    }

    fn goto_row(&mut self, row: usize) -> Result<Option<Batch>, CursorError> {
        self.traffic.pass_gate();
        self.traffic.check_fetch()?;
        self.traffic
            .row_fetches
            .lock()
            .push((row, self.inner.rows_per_page()));
        let batch = self.inner.goto_row(row)?;
        Ok(match *self.traffic.row_limit.lock() {
            Some(limit) => batch.map(|b| {
                let keep = limit.saturating_sub(row).min(b.num_rows());
                b.slice(0, keep)
            }),
            None => batch,
        })
    }

    fn set_fetch_size(&mut self, rows: usize) {
        self.inner.set_fetch_size(rows)
    }

    fn rows_per_page(&self) -> usize {
        self.inner.rows_per_page()
    }

    fn current_page_index(&self) -> usize {
        self.inner.current_page_index()
    }

    fn max_page_index(&self) -> usize {
        self.inner.max_page_index()
    }

    fn total_rows(&self) -> usize {
        self.inner.total_rows()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.traffic.closes.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.close();
    }
}

/// Listener recording every change it sees
pub fn recorder() -> (Arc<dyn ChangeListener>, Arc<Mutex<Vec<DataChange>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    (listener_fn(move |change| log.lock().push(*change)), seen)
}

/// Error sink recording every error it sees
pub fn error_recorder() -> (Arc<dyn ErrorSink>, Arc<Mutex<Vec<PagingError>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    (error_sink_fn(move |error| log.lock().push(error.clone())), seen)
}
