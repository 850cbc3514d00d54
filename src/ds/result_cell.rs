//! Write-once result cell with blocking and continuation-based readers.
//!
//! A `ResultCell<T, E>` starts empty and transitions exactly once to either a
//! value or an error. Readers either block in [`ResultCell::get`] or register a
//! continuation with [`ResultCell::on_ready`], which runs on whichever thread
//! completes the cell (or immediately, on the caller, if it is already done).
//!
//! ## Architecture
//!
//! ```text
//!   producer                         consumers
//!      │                          ┌── get()      (parks on Condvar)
//!      │ set(v) / set_error(e)    ├── on_ready(f) (queued continuation)
//!      ▼                          └── try_get()   (non-blocking)
//!   ┌───────────────────────────────────────────┐
//!   │ Mutex<Inner { state, continuations }>     │
//!   │   state: Empty ──► Set(T) | SetError(E)   │
//!   └───────────────────────────────────────────┘
//! ```
//!
//! Continuations are taken out of the lock before they run, so a continuation
//! may freely touch the cell (or anything else) without deadlocking. A
//! continuation that panics on the completing thread is logged and skipped;
//! the remaining continuations still run.

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::AlreadySetError;

type Continuation<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

#[derive(Debug)]
enum State<T, E> {
    Empty,
    Set(T),
    SetError(E),
}

struct Inner<T, E> {
    state: State<T, E>,
    continuations: Vec<Continuation<T, E>>,
}

impl<T: Clone, E: Clone> Inner<T, E> {
    fn outcome(&self) -> Option<Result<T, E>> {
        match &self.state {
            State::Empty => None,
            State::Set(value) => Some(Ok(value.clone())),
            State::SetError(error) => Some(Err(error.clone())),
        }
    }
}

/// Single-assignment value/error holder shared between a producer and any
/// number of consumers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use imagecache::ds::ResultCell;
///
/// let cell: Arc<ResultCell<u32, String>> = Arc::new(ResultCell::new());
/// let producer = Arc::clone(&cell);
/// let handle = thread::spawn(move || producer.set(42).unwrap());
///
/// assert_eq!(cell.get(), Ok(42));
/// handle.join().unwrap();
/// assert!(cell.set(7).is_err());
/// ```
pub struct ResultCell<T, E> {
    inner: Mutex<Inner<T, E>>,
    ready: Condvar,
}

impl<T, E> ResultCell<T, E>
where
    T: Clone,
    E: Clone,
{
    /// Creates an empty cell.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Empty,
                continuations: Vec::new(),
            }),
            ready: Condvar::new(),
        }
    }

    /// Stores `value`, waking blocked readers and running continuations.
    ///
    /// Fails with [`AlreadySetError`] if the cell was already completed; the
    /// stored outcome is left untouched.
    pub fn set(&self, value: T) -> Result<(), AlreadySetError> {
        self.complete(State::Set(value))
    }

    /// Stores `error`, waking blocked readers and running continuations.
    pub fn set_error(&self, error: E) -> Result<(), AlreadySetError> {
        self.complete(State::SetError(error))
    }

    /// Completes the cell from a `Result`.
    pub fn set_result(&self, result: Result<T, E>) -> Result<(), AlreadySetError> {
        match result {
            Ok(value) => self.set(value),
            Err(error) => self.set_error(error),
        }
    }

    /// Blocks until the cell is completed, then returns a clone of its outcome.
    pub fn get(&self) -> Result<T, E> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(outcome) = inner.outcome() {
                return outcome;
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Like [`get`](Self::get), giving up after `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Option<Result<T, E>> {
        let mut inner = self.inner.lock();
        if let Some(outcome) = inner.outcome() {
            return Some(outcome);
        }
        self.ready.wait_while_for(
            &mut inner,
            |inner| matches!(inner.state, State::Empty),
            timeout,
        );
        inner.outcome()
    }

    /// Returns the outcome if the cell is completed, without blocking.
    pub fn try_get(&self) -> Option<Result<T, E>> {
        self.inner.lock().outcome()
    }

    /// Returns `true` once the cell holds a value or an error.
    pub fn is_set(&self) -> bool {
        !matches!(self.inner.lock().state, State::Empty)
    }

    /// Runs `continuation` with the outcome once the cell is completed.
    ///
    /// If the cell is already completed, `continuation` runs immediately on
    /// the calling thread. Otherwise it runs on the thread that completes the
    /// cell. Either way it runs exactly once.
    pub fn on_ready<F>(&self, continuation: F)
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        let outcome = {
            let mut inner = self.inner.lock();
            match inner.outcome() {
                Some(outcome) => outcome,
                None => {
                    inner.continuations.push(Box::new(continuation));
                    return;
                },
            }
        };
        continuation(outcome);
    }

    fn complete(&self, state: State<T, E>) -> Result<(), AlreadySetError> {
        let (continuations, outcome) = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, State::Empty) {
                return Err(AlreadySetError);
            }
            inner.state = state;
            let continuations = mem::take(&mut inner.continuations);
            (continuations, inner.outcome())
        };
        self.ready.notify_all();

        if let Some(outcome) = outcome {
            for continuation in continuations {
                let outcome = outcome.clone();
                if panic::catch_unwind(AssertUnwindSafe(|| continuation(outcome))).is_err() {
                    tracing::error!("result cell continuation panicked; continuing with the rest");
                }
            }
        }
        Ok(())
    }
}

impl<T, E> Default for ResultCell<T, E>
where
    T: Clone,
    E: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> std::fmt::Debug for ResultCell<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        let state = match inner.state {
            State::Empty => "empty",
            State::Set(_) => "set",
            State::SetError(_) => "error",
        };
        f.debug_struct("ResultCell")
            .field("state", &state)
            .field("continuations", &inner.continuations.len())
            .finish()
    }
}

/// Blocks until every cell is completed and returns the values in input
/// order, skipping cells that completed with an error.
pub fn collect_all<'a, T, E, I>(cells: I) -> Vec<T>
where
    T: Clone + 'a,
    E: Clone + 'a,
    I: IntoIterator<Item = &'a ResultCell<T, E>>,
{
    cells.into_iter().filter_map(|cell| cell.get().ok()).collect()
}

/// Like [`collect_all`] for cells whose value may be absent; empty values are
/// skipped along with errors.
pub fn collect_some<'a, T, E, I>(cells: I) -> Vec<T>
where
    T: Clone + 'a,
    E: Clone + 'a,
    I: IntoIterator<Item = &'a ResultCell<Option<T>, E>>,
{
    cells
        .into_iter()
        .filter_map(|cell| cell.get().ok().flatten())
        .collect()
}
