//! Single-shot timer that collapses bursts of resize/scroll events
//!
//! Each [`ResizeDebouncer::restart`] cancels the pending firing and arms a new
//! one. The action runs on the tokio runtime the debouncer was built with, so
//! actions that touch consumer state must marshal through the dispatcher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Default settle interval
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Action invoked once per settle
pub type DebounceAction = Arc<dyn Fn() + Send + Sync>;

pub struct ResizeDebouncer {
    delay: Duration,
    runtime: Handle,
    action: Arc<RwLock<Option<DebounceAction>>>,
    armed: Mutex<Option<JoinHandle<()>>>,
    generation: Arc<AtomicU64>,
}

impl ResizeDebouncer {
    /// Create a debouncer with no action registered yet
    pub fn new(delay: Duration, runtime: Handle) -> Self {
        Self {
            delay,
            runtime,
            action: Arc::new(RwLock::new(None)),
            armed: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register the action fired on settle, replacing any previous one
    pub fn set_action(&self, action: DebounceAction) {
        *self.action.write() = Some(action);
    }

    /// (Re)arm the timer, cancelling a pending firing
    pub fn restart(&self) {
        let mut armed = self.armed.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = armed.take() {
            previous.abort();
        }

        let delay = self.delay;
        let current = self.generation.clone();
        let action = self.action.clone();
        *armed = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            // A restart that raced the abort bumps the generation
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            let action = action.read().clone();
            if let Some(action) = action {
                tracing::trace!(generation, "debounce settled");
                action();
            }
        }));
    }

    /// Drop a pending firing without scheduling a new one
    pub fn cancel(&self) {
        let mut armed = self.armed.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = armed.take() {
            previous.abort();
        }
    }

    /// Whether a firing is scheduled and has not run yet
    pub fn is_pending(&self) -> bool {
        self.armed
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for ResizeDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap()
    }

    fn counting(debouncer: &ResizeDebouncer) -> Arc<AtomicUsize> {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        debouncer.set_action(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        fired
    }

    #[test]
    fn test_burst_fires_once() {
        let rt = runtime();
        let debouncer = ResizeDebouncer::new(Duration::from_millis(40), rt.handle().clone());
        let fired = counting(&debouncer);

        for _ in 0..10 {
            debouncer.restart();
        }
        assert!(debouncer.is_pending());

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_each_settle_fires() {
        let rt = runtime();
        let debouncer = ResizeDebouncer::new(Duration::from_millis(20), rt.handle().clone());
        let fired = counting(&debouncer);

        debouncer.restart();
        std::thread::sleep(Duration::from_millis(200));
        debouncer.restart();
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancel_suppresses_firing() {
        let rt = runtime();
        let debouncer = ResizeDebouncer::new(Duration::from_millis(40), rt.handle().clone());
        let fired = counting(&debouncer);

        debouncer.restart();
        debouncer.cancel();
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!debouncer.is_pending());
    }
}
