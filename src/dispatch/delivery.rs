//! Serial execution context for callbacks.
//!
//! A `DeliveryQueue` owns one tokio task that drains an unbounded channel of
//! boxed jobs in FIFO order. Completion handlers and session listeners are
//! scheduled here so they never run on the transport task.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a serial callback executor. Cheap to clone.
#[derive(Clone)]
pub struct DeliveryQueue {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Job>,
}

impl DeliveryQueue {
    /// Start a queue on the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn new(name: &str) -> Self {
        Self::with_handle(name, &Handle::current())
    }

    /// Start a queue on the given runtime.
    pub fn with_handle(name: &str, runtime: &Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let name: Arc<str> = Arc::from(name);
        runtime.spawn(drain(Arc::clone(&name), rx));
        Self { name, tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedule `job` after everything already queued.
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            tracing::warn!(queue = %self.name, "Delivery queue stopped, dropping callback");
        }
    }
}

impl fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("name", &self.name)
            .finish()
    }
}

async fn drain(name: Arc<str>, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        // A panicking callback must not take the queue down with it.
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!(queue = %name, "Callback panicked");
        }
    }
    tracing::trace!(queue = %name, "Delivery queue closed");
}
