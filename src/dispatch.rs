//! Callback contexts for miss deliveries.
//!
//! Cache hits are delivered synchronously on the requesting thread. Misses are
//! delivered later, through a [`Dispatcher`], on whatever execution context the
//! host designates (a UI thread, an event loop, or simply the worker that
//! finished the render).
//!
//! | Dispatcher         | Where callbacks run                               |
//! |--------------------|---------------------------------------------------|
//! | `InlineDispatcher` | On the worker thread that completed the render    |
//! | `QueueDispatcher`  | On whichever thread drains the paired `CallbackQueue` |

use std::sync::mpsc;
use std::time::{Duration, Instant};

/// A unit of deferred callback work.
pub type Job = Box<dyn FnOnce() + Send>;

/// Hands deferred callbacks to the designated callback context.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Runs every job immediately on the dispatching thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Job) {
        job();
    }
}

/// Sends jobs to a [`CallbackQueue`] drained by the host's callback thread.
#[derive(Debug, Clone)]
pub struct QueueDispatcher {
    tx: mpsc::Sender<Job>,
}

impl Dispatcher for QueueDispatcher {
    fn dispatch(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::warn!("callback queue dropped; discarding delivery");
        }
    }
}

/// Receiving end of a [`QueueDispatcher`].
///
/// Whoever calls the `run_*` methods becomes the callback context.
#[derive(Debug)]
pub struct CallbackQueue {
    rx: mpsc::Receiver<Job>,
}

/// Creates a connected dispatcher/queue pair.
pub fn callback_queue() -> (QueueDispatcher, CallbackQueue) {
    let (tx, rx) = mpsc::channel();
    (QueueDispatcher { tx }, CallbackQueue { rx })
}

impl CallbackQueue {
    /// Runs every job already queued, without waiting. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Waits up to `timeout` for one job and runs it.
    pub fn run_one_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            },
            Err(_) => false,
        }
    }

    /// Runs jobs until `count` have run or `timeout` elapses. Returns how many
    /// ran.
    pub fn run_until(&self, count: usize, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut ran = 0;
        while ran < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.run_one_timeout(remaining) {
                break;
            }
            ran += 1;
        }
        ran
    }
}
