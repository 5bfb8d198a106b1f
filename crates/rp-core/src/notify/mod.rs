//! Change notification back to the consumer
//!
//! Listeners and the error sink are held weakly so the notification path
//! never keeps a consumer alive. Every delivery goes through the
//! [`ConsumerDispatcher`], so callbacks always run on the consumer thread.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::data::RowRange;
use crate::dispatch::ConsumerDispatcher;
use crate::error::PagingError;
use crate::viewport::Viewport;

/// What changed in the bound data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChange {
    /// Row count or structure changed; re-query everything
    Full,
    /// Rows in this range were (re)materialized
    Rows(RowRange),
}

/// Trait for components that re-render on data changes
pub trait ChangeListener: Send + Sync {
    fn on_data_changed(&self, change: &DataChange);
}

/// The single sink receiving every paging failure
pub trait ErrorSink: Send + Sync {
    fn on_error(&self, error: &PagingError);
}

struct FnListener<F>(F);

impl<F> ChangeListener for FnListener<F>
where
    F: Fn(&DataChange) + Send + Sync,
{
    fn on_data_changed(&self, change: &DataChange) {
        (self.0)(change)
    }
}

struct FnErrorSink<F>(F);

impl<F> ErrorSink for FnErrorSink<F>
where
    F: Fn(&PagingError) + Send + Sync,
{
    fn on_error(&self, error: &PagingError) {
        (self.0)(error)
    }
}

/// Create a change listener from a closure
pub fn listener_fn<F>(f: F) -> Arc<dyn ChangeListener>
where
    F: Fn(&DataChange) + Send + Sync + 'static,
{
    Arc::new(FnListener(f))
}

/// Create an error sink from a closure
pub fn error_sink_fn<F>(f: F) -> Arc<dyn ErrorSink>
where
    F: Fn(&PagingError) + Send + Sync + 'static,
{
    Arc::new(FnErrorSink(f))
}

#[derive(Default)]
struct Registry {
    listeners: RwLock<Vec<Weak<dyn ChangeListener>>>,
    error_sink: RwLock<Option<Weak<dyn ErrorSink>>>,
}

impl Registry {
    fn live_listeners(&self) -> Vec<Arc<dyn ChangeListener>> {
        let mut listeners = self.listeners.write();

        // Remove any dead weak references
        listeners.retain(|weak| weak.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
    }

    fn deliver(&self, change: &DataChange) {
        // Call outside the lock so a listener may subscribe or notify again
        for listener in self.live_listeners() {
            listener.on_data_changed(change);
        }
    }

    fn deliver_error(&self, error: &PagingError) {
        let sink = self.error_sink.read().as_ref().and_then(Weak::upgrade);
        match sink {
            Some(sink) => sink.on_error(error),
            None => tracing::warn!(%error, "paging error with no error sink registered"),
        }
    }
}

/// Fan-out of data-changed events, cheap to clone across threads
#[derive(Clone)]
pub struct ChangeNotifier {
    registry: Arc<Registry>,
    dispatcher: Arc<ConsumerDispatcher>,
}

impl ChangeNotifier {
    pub fn new(dispatcher: Arc<ConsumerDispatcher>) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            dispatcher,
        }
    }

    /// Add a listener; it stays registered while the caller keeps the `Arc`
    pub fn subscribe(&self, listener: &Arc<dyn ChangeListener>) {
        self.registry.listeners.write().push(Arc::downgrade(listener));
    }

    /// Register the error sink, replacing any previous one
    pub fn set_error_sink(&self, sink: &Arc<dyn ErrorSink>) {
        *self.registry.error_sink.write() = Some(Arc::downgrade(sink));
    }

    /// Number of listeners still alive
    pub fn listener_count(&self) -> usize {
        self.registry.live_listeners().len()
    }

    /// Notify listeners on the consumer thread
    pub fn notify_changed(&self, change: DataChange) {
        let registry = self.registry.clone();
        self.dispatcher.dispatch(move || registry.deliver(&change));
    }

    /// Notify listeners, saving the viewport's view state before delivery and
    /// restoring it afterwards
    pub fn notify_preserving_view(&self, change: DataChange, viewport: Weak<dyn Viewport>) {
        let registry = self.registry.clone();
        self.dispatcher.dispatch(move || {
            let viewport = viewport.upgrade();
            let saved = viewport.as_ref().and_then(|v| v.capture_view_state());

            registry.deliver(&change);

            if let (Some(viewport), Some(saved)) = (viewport, saved) {
                viewport.restore_view_state(saved);
            }
        });
    }

    /// Hand an error to the error sink on the consumer thread
    pub fn report_error(&self, error: PagingError) {
        let registry = self.registry.clone();
        self.dispatcher.dispatch(move || registry.deliver_error(&error));
    }
}
