use rp_core::{Query, RowRange, SortKey};

/// Lifecycle of a window cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePhase {
    /// No row count requested yet
    Uninitialized,
    /// Count fetch pending or running
    Counting,
    /// Count known, nothing materialized
    Ready,
    /// A window fetch is running
    Loading,
    /// A window is materialized in the sink
    Loaded,
    /// Query or sort changed; waiting for the worker to start over
    Stale,
}

/// Requested versus materialized rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub requested: Option<RowRange>,
    pub loaded: Option<RowRange>,
}

impl Window {
    pub fn requested_first(&self) -> i64 {
        self.requested.map(|r| r.first as i64).unwrap_or(-1)
    }

    pub fn requested_last(&self) -> i64 {
        self.requested.map(|r| r.last as i64).unwrap_or(-1)
    }

    pub fn loaded_first(&self) -> i64 {
        self.loaded.map(|r| r.first as i64).unwrap_or(-1)
    }

    pub fn loaded_last(&self) -> i64 {
        self.loaded.map(|r| r.last as i64).unwrap_or(-1)
    }

    /// Whether `row` can be served from the sink
    pub fn is_loaded(&self, row: usize) -> bool {
        self.loaded.map(|r| r.contains(row)).unwrap_or(false)
    }

    /// Whether the requested rows are already materialized
    pub fn is_satisfied(&self) -> bool {
        match (self.requested, self.loaded) {
            (Some(requested), Some(loaded)) => {
                loaded.first <= requested.first && requested.last <= loaded.last
            }
            _ => false,
        }
    }
}

/// Work the background worker picks up next
#[derive(Debug)]
pub(crate) enum Job {
    Count {
        query: Query,
        generation: u64,
    },
    Load {
        query: Query,
        projection: Option<Vec<usize>>,
        range: RowRange,
        generation: u64,
    },
}

/// Everything guarded by the cache mutex
#[derive(Debug)]
pub(crate) struct CacheState {
    pub phase: CachePhase,
    pub window: Window,
    pub total_rows: Option<usize>,
    /// Installed query, with the current sort key applied
    pub query: Option<Query>,
    pub projection: Option<Vec<usize>>,
    pub sort: Option<SortKey>,
    /// Bumped on every query or sort change; results from older generations are dropped
    pub generation: u64,
    pub want_count: bool,
    pub want_load: bool,
    /// Rebuild the window from the viewport once the next count lands
    pub reload_after_count: bool,
    pub initialized: bool,
    pub suspended: bool,
    pub closed: bool,
}

impl CacheState {
    pub fn new() -> Self {
        Self {
            phase: CachePhase::Uninitialized,
            window: Window::default(),
            total_rows: None,
            query: None,
            projection: None,
            sort: None,
            generation: 0,
            want_count: false,
            want_load: false,
            reload_after_count: false,
            initialized: false,
            suspended: false,
            closed: false,
        }
    }

    /// Forget everything derived from the previous query or sort order
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.window = Window::default();
        self.total_rows = None;
        self.want_load = false;
        self.want_count = false;
        self.reload_after_count = false;
    }

    /// Decide the next job for the worker, consuming the matching want flag
    pub fn next_job(&mut self) -> Option<Job> {
        if self.closed || self.suspended {
            self.want_count = false;
            self.want_load = false;
            return None;
        }
        let query = self.query.clone()?;

        if self.total_rows.is_none() {
            if !(self.want_count || self.want_load) {
                return None;
            }
            self.want_count = false;
            self.phase = CachePhase::Counting;
            return Some(Job::Count {
                query,
                generation: self.generation,
            });
        }

        if !self.want_load {
            return None;
        }
        self.want_load = false;

        let range = self.window.requested?;
        if self.window.is_satisfied() {
            return None;
        }
        self.phase = CachePhase::Loading;
        Some(Job::Load {
            query,
            projection: self.projection.clone(),
            range,
            generation: self.generation,
        })
    }

    /// Phase to fall back to after a job ends without a new window
    pub fn settled_phase(&self) -> CachePhase {
        if self.window.loaded.is_some() {
            CachePhase::Loaded
        } else if self.total_rows.is_some() {
            CachePhase::Ready
        } else {
            CachePhase::Stale
        }
    }
}
