//! Headless demo: pages and scrolls through a generated SQLite table
//!
//! Usage: `rowpager [settings.json]`

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::{info, warn};

use rp_core::{
    error_sink_fn, listener_fn, ConsumerDispatcher, PagingContext, PagingSettings,
    Query, QueryParam, RemoteCursor, RowSink, SharedSink, SortKey, Viewport,
};
use rp_data::{BatchSink, SqliteCursor};
use rp_paging::{PageController, WindowCache};

mod sample_db;

const SAMPLE_ROWS: usize = 10_000;
const ROW_HEIGHT: f32 = 20.0;

/// Stand-in for a table widget: a visible span and a height in pixels
struct ConsoleViewport {
    first: AtomicUsize,
    height: AtomicU32,
}

impl ConsoleViewport {
    fn new(height: f32) -> Arc<Self> {
        Arc::new(Self {
            first: AtomicUsize::new(0),
            height: AtomicU32::new(height.to_bits()),
        })
    }

    fn visible_rows(&self) -> usize {
        self.row_capacity().unwrap_or(1)
    }

    fn scroll_to(&self, first: usize) {
        self.first.store(first, Ordering::Relaxed);
    }

    fn resize(&self, height: f32) {
        self.height.store(height.to_bits(), Ordering::Relaxed);
    }
}

impl Viewport for ConsoleViewport {
    fn first_visible_row(&self) -> usize {
        self.first.load(Ordering::Relaxed)
    }

    fn last_visible_row(&self) -> usize {
        self.first_visible_row() + self.visible_rows() - 1
    }

    fn available_extent(&self) -> f32 {
        f32::from_bits(self.height.load(Ordering::Relaxed))
    }

    fn unit_extent(&self) -> f32 {
        ROW_HEIGHT
    }
}

/// Run queued consumer work until `done` holds
fn pump_until(dispatcher: &ConsumerDispatcher, timeout: Duration, done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        dispatcher.run_pending();
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn print_rows(sink: &RwLock<BatchSink>, limit: usize) {
    let sink = sink.read();
    for row in 0..sink.row_count().min(limit) {
        if let Some(cells) = sink.row_text(row) {
            println!("  {}", cells.join(" | "));
        }
    }
}

fn page_through(
    context: &PagingContext,
    cursor: Arc<dyn RemoteCursor>,
    timeout: Duration,
) -> Result<()> {
    let viewport = ConsoleViewport::new(10.0 * ROW_HEIGHT);
    let sink = Arc::new(RwLock::new(BatchSink::new()));
    let shared: SharedSink = sink.clone();
    let weak_viewport = Arc::downgrade(&viewport);
    let controller = PageController::new(cursor, shared, weak_viewport, context);

    let query = Query::new("SELECT id, timestamp, sensor_id, temperature, status FROM sensor_telemetry WHERE status = ?")
        .with_params(vec![QueryParam::Text("OK".into())]);
    controller.change_query(query, 0)?;
    info!(
        total_rows = ?controller.total_rows(),
        pages = controller.max_page_index() + 1,
        rows_per_page = controller.effective_rows_per_page(),
        "query installed"
    );

    controller.next_page()?;
    controller.next_page()?;
    println!("page {}:", controller.current_page_index());
    print_rows(&sink, 3);

    controller.last_page()?;
    println!("last page {}:", controller.current_page_index());
    print_rows(&sink, 3);

    // Grow the view; the page size follows once the geometry settles
    let before = controller.max_page_index();
    viewport.resize(25.0 * ROW_HEIGHT);
    controller.on_geometry_changed();
    if pump_until(&context.dispatcher, timeout, || controller.max_page_index() != before) {
        info!(
            rows_per_page = controller.effective_rows_per_page(),
            page = controller.current_page_index(),
            "page size recomputed"
        );
    } else {
        warn!("page size did not settle in time");
    }

    controller.on_hidden();
    controller.on_shown();
    Ok(())
}

fn scroll_through(
    context: &PagingContext,
    cursor: Arc<dyn RemoteCursor>,
    timeout: Duration,
) -> Result<()> {
    let dispatcher = context.dispatcher.clone();
    let viewport = ConsoleViewport::new(15.0 * ROW_HEIGHT);
    let sink = Arc::new(RwLock::new(BatchSink::new()));
    let shared: SharedSink = sink.clone();
    let weak_viewport = Arc::downgrade(&viewport);
    let cache = WindowCache::new(cursor, shared, weak_viewport, context)?;

    let changes = Arc::new(AtomicUsize::new(0));
    let counter = changes.clone();
    let listener = listener_fn(move |change| {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(?change, "data changed");
    });
    let errors = error_sink_fn(|error| warn!(%error, "window cache error"));
    cache.notifier().subscribe(&listener);
    cache.notifier().set_error_sink(&errors);

    cache.set_query(
        Query::new("SELECT id, timestamp, sensor_id, temperature FROM sensor_telemetry"),
        None,
    );
    cache.row_count();
    if !pump_until(&dispatcher, timeout, || cache.total_rows().is_some()) {
        anyhow::bail!("row count did not resolve");
    }
    let total = cache.row_count();
    info!(total, "row count resolved");

    let show = |first: usize| -> Result<()> {
        viewport.scroll_to(first);
        // Rendering the first visible cell is what asks for the window
        let _ = cache.value_at(first, 0);
        let loaded = pump_until(&dispatcher, timeout, || !cache.value_at(first, 0).is_pending());
        if !loaded {
            anyhow::bail!("window at row {} did not load", first);
        }
        let window = cache.window();
        let cells: Vec<String> = (0..4).map(|col| cache.value_at(first, col).to_string()).collect();
        println!(
            "rows {}..={} loaded, first: {}",
            window.loaded_first(),
            window.loaded_last(),
            cells.join(" | ")
        );
        Ok(())
    };

    for first in [0, total / 4, total / 2, total.saturating_sub(15)] {
        show(first).with_context(|| format!("scrolling to row {}", first))?;
    }

    cache.set_sort_key(Some(SortKey::descending(3)));
    if !pump_until(&dispatcher, timeout, || cache.total_rows().is_some()) {
        anyhow::bail!("row count did not resolve after sorting");
    }
    println!("hottest readings:");
    show(0)?;

    info!(events = changes.load(Ordering::Relaxed), "window cache done");
    cache.close();
    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let settings = match std::env::args().nth(1) {
        Some(path) => PagingSettings::load(&path).with_context(|| format!("loading settings from {}", path))?,
        None => PagingSettings::default(),
    };
    info!(debounce = ?settings.debounce, rows_per_page = ?settings.rows_per_page, "starting rowpager");
    let timeout = settings.debounce * 8 + Duration::from_secs(2);

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    let dispatcher = Arc::new(ConsumerDispatcher::new());
    let context = PagingContext::new(runtime.handle().clone(), dispatcher).with_settings(settings);

    let dir = tempfile::tempdir().context("creating scratch directory")?;
    let path = dir.path().join("sample_analytics.db");
    sample_db::create_sample_database(&path, SAMPLE_ROWS).context("creating sample database")?;
    let cursor: Arc<dyn RemoteCursor> = Arc::new(SqliteCursor::new(&path));

    page_through(&context, cursor.clone(), timeout)?;
    scroll_through(&context, cursor, timeout)?;

    info!("done");
    Ok(())
}
