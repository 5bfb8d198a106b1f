//! Marshalling onto the consumer's logical thread
//!
//! The dispatcher remembers the thread that created it. Work submitted from
//! that thread runs inline; work submitted from anywhere else is queued until
//! the consumer calls [`ConsumerDispatcher::run_pending`], typically once per
//! frame.

use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// A unit of work to run on the consumer thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Hook invoked whenever a task is queued from another thread
pub type Waker = Arc<dyn Fn() + Send + Sync>;

pub struct ConsumerDispatcher {
    owner: ThreadId,
    sender: UnboundedSender<Task>,
    receiver: Mutex<UnboundedReceiver<Task>>,
    waker: Mutex<Option<Waker>>,
}

impl ConsumerDispatcher {
    /// Create a dispatcher bound to the calling thread
    pub fn new() -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            owner: std::thread::current().id(),
            sender,
            receiver: Mutex::new(receiver),
            waker: Mutex::new(None),
        }
    }

    /// Register a hook such as a repaint request
    pub fn set_waker(&self, waker: Waker) {
        *self.waker.lock() = Some(waker);
    }

    pub fn is_consumer_thread(&self) -> bool {
        std::thread::current().id() == self.owner
    }

    /// Run `task` on the consumer thread: inline if we are already there,
    /// queued otherwise
    pub fn dispatch<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_consumer_thread() {
            task();
        } else {
            self.post(task);
        }
    }

    /// Queue `task` for the next [`run_pending`](Self::run_pending) call
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(task)).is_err() {
            // The receiver lives as long as we do
            tracing::warn!("consumer queue closed, dropping task");
            return;
        }
        tracing::trace!("task queued for consumer thread");

        let waker = self.waker.lock().clone();
        if let Some(waker) = waker {
            waker();
        }
    }

    /// Drain queued tasks. Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        if !self.is_consumer_thread() {
            tracing::warn!("run_pending called off the consumer thread; ignoring");
            return 0;
        }

        let mut ran = 0;
        loop {
            // Pop one at a time so a task may queue more work
            let task = self.receiver.lock().try_recv();
            match task {
                Ok(task) => {
                    task();
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran
    }
}

impl Default for ConsumerDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
