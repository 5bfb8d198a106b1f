//! Background worker for a window cache
//!
//! One named thread per cache. It sleeps on a capacity-one wake channel, so
//! any number of kicks while a job runs collapse into a single re-evaluation
//! of the latest state.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rp_core::{
    Batch, ChangeNotifier, CursorError, CursorSession, DataChange, FillMode, PagingError, Query,
    RemoteCursor, RowRange, SharedSink, Viewport,
};
use tokio::sync::mpsc;

use super::state::{CacheState, Job};
use crate::session::open_session;

/// A session tagged with the query generation it was opened for
pub(crate) struct OpenSession {
    pub session: Box<dyn CursorSession>,
    pub generation: u64,
}

/// State shared between the consumer side and the worker thread.
///
/// Lock order is `state` before `sink` and `state` before `session`. The
/// worker holds `session` alone while a fetch is in flight; the consumer only
/// ever `try_lock`s it.
pub(crate) struct Shared {
    pub state: Mutex<CacheState>,
    pub session: Mutex<Option<OpenSession>>,
    pub cursor: Arc<dyn RemoteCursor>,
    pub sink: SharedSink,
    pub viewport: Weak<dyn Viewport>,
    pub notifier: ChangeNotifier,
    pub count_fetch_size: usize,
    pub wake: Mutex<Option<mpsc::Sender<()>>>,
}

impl Shared {
    /// Wake the worker; a wake already pending is enough
    pub fn kick(&self) {
        if let Some(wake) = self.wake.lock().as_ref() {
            let _ = wake.try_send(());
        }
    }

    /// Close the session if the worker is not using it
    pub fn try_close_session(&self) {
        if let Some(mut slot) = self.session.try_lock() {
            if let Some(mut open) = slot.take() {
                open.session.close();
            }
        }
    }

    /// Close the session opened for an outdated `generation`
    fn retire_session(&self, generation: u64) {
        let mut slot = self.session.lock();
        if slot.as_ref().map(|open| open.generation == generation).unwrap_or(false) {
            if let Some(mut open) = slot.take() {
                open.session.close();
            }
        }
    }

    fn close_session(&self) {
        if let Some(mut open) = self.session.lock().take() {
            open.session.close();
        }
    }

    fn notify(&self, change: DataChange) {
        self.notifier.notify_preserving_view(change, self.viewport.clone());
    }

    /// Run `op` against a session for `generation`, reopening a closed or
    /// outdated one. A session that dies mid-call is reopened once.
    fn with_session<T, F>(
        &self,
        query: &Query,
        generation: u64,
        fetch_size: usize,
        mut op: F,
    ) -> Result<T, PagingError>
    where
        F: FnMut(&mut dyn CursorSession) -> Result<T, CursorError>,
    {
        let mut slot = self.session.lock();
        let mut reopened = false;

        loop {
            let reusable = slot
                .as_ref()
                .map(|open| open.generation == generation && !open.session.is_closed())
                .unwrap_or(false);
            if !reusable {
                if let Some(mut stale) = slot.take() {
                    tracing::debug!(session = %stale.session.id(), "replacing stale session");
                    stale.session.close();
                }
                let session = open_session(self.cursor.as_ref(), query, fetch_size)?;
                *slot = Some(OpenSession { session, generation });
                reopened = true;
            }

            let open = slot.as_mut().ok_or(PagingError::StaleSession)?;
            match op(open.session.as_mut()) {
                Ok(value) => return Ok(value),
                Err(CursorError::Closed) if !reopened => {
                    tracing::warn!(session = %open.session.id(), "session closed during fetch; reopening");
                    if let Some(mut dead) = slot.take() {
                        dead.session.close();
                    }
                }
                Err(e) => return Err(PagingError::Fetch(e)),
            }
        }
    }
}

/// Worker thread body
pub(crate) fn run(shared: Arc<Shared>, mut wake: mpsc::Receiver<()>) {
    tracing::debug!("window worker started");

    while wake.blocking_recv().is_some() {
        loop {
            let job = shared.state.lock().next_job();
            match job {
                Some(Job::Count { query, generation }) => count(&shared, query, generation),
                Some(Job::Load {
                    query,
                    projection,
                    range,
                    generation,
                }) => load(&shared, query, projection, range, generation),
                None => break,
            }
        }
    }

    shared.close_session();
    tracing::debug!("window worker stopped");
}

fn count(shared: &Shared, query: Query, generation: u64) {
    let result = shared.with_session(&query, generation, shared.count_fetch_size, |session| {
        Ok(session.total_rows())
    });

    let mut state = shared.state.lock();
    if state.closed || state.generation != generation {
        drop(state);
        tracing::debug!(generation, "discarding count for an outdated query");
        shared.retire_session(generation);
        return;
    }

    match result {
        Ok(total) => {
            tracing::debug!(total, "row count resolved");
            state.total_rows = Some(total);
            state.window.requested = state.window.requested.and_then(|r| r.clamp_to(total));
            if std::mem::take(&mut state.reload_after_count) {
                state.requested_from_viewport(&shared.viewport, None);
                state.want_load = state.window.requested.is_some();
            }
            state.phase = state.settled_phase();
            drop(state);
            shared.notify(DataChange::Full);
        }
        Err(error) => {
            state.suspended = true;
            state.phase = state.settled_phase();
            drop(state);
            tracing::warn!(%error, "row count failed");
            shared.notifier.report_error(error);
        }
    }
}

fn load(
    shared: &Shared,
    query: Query,
    projection: Option<Vec<usize>>,
    range: RowRange,
    generation: u64,
) {
    tracing::debug!(first = range.first, last = range.last, "loading window");
    let result = shared
        .with_session(&query, generation, range.len(), |session| {
            session.set_fetch_size(range.len());
            session.goto_row(range.first)
        })
        .and_then(|batch| project(batch, projection.as_deref()));

    let mut state = shared.state.lock();
    if state.closed || state.generation != generation {
        drop(state);
        tracing::debug!(generation, "discarding window for an outdated query");
        shared.retire_session(generation);
        return;
    }
    if state.window.requested != Some(range) {
        // The viewport moved while we were fetching
        tracing::debug!(
            first = range.first,
            last = range.last,
            requested_first = state.window.requested_first(),
            requested_last = state.window.requested_last(),
            "discarding superseded window"
        );
        state.want_load = true;
        state.phase = state.settled_phase();
        return;
    }

    match result {
        Ok(batch) => {
            let rows = batch.as_ref().map(|b| b.num_rows()).unwrap_or(0);
            {
                let mut sink = shared.sink.write();
                match batch {
                    Some(batch) => sink.add_batch(batch, FillMode::Overwrite),
                    None => sink.clear(),
                }
            }
            state.window.loaded = (rows > 0).then(|| RowRange::new(range.first, range.first + rows - 1));
            let shrunk = rows < range.len();
            if shrunk {
                // Fewer rows than counted: the result set ends here
                let total = range.first + rows;
                tracing::debug!(expected = range.len(), rows, total, "window came back short");
                state.total_rows = Some(total);
                state.window.requested = state.window.loaded;
            }
            state.phase = state.settled_phase();
            let change = DataChange::Rows(state.window.loaded.unwrap_or(range));
            drop(state);
            shared.notify(change);
            if shrunk {
                shared.notify(DataChange::Full);
            }
        }
        Err(error) => {
            state.suspended = true;
            state.phase = state.settled_phase();
            drop(state);
            tracing::warn!(%error, first = range.first, last = range.last, "window load failed");
            shared.notifier.report_error(error);
        }
    }
}

fn project(batch: Option<Batch>, projection: Option<&[usize]>) -> Result<Option<Batch>, PagingError> {
    match (batch, projection) {
        (Some(batch), Some(columns)) => batch
            .project(columns)
            .map(Some)
            .map_err(|e| PagingError::Fetch(e.into())),
        (batch, _) => Ok(batch),
    }
}

