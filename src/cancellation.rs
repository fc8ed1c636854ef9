//! Cooperative cancellation: a single latch shared between an owning source and
//! cheap, read-only token views handed to workers.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct Latch {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

/// Owns the cancellation latch. Only the holder of the source may cancel or reset it.
#[derive(Clone)]
pub struct CancellationTokenSource {
    latch: Arc<Latch>,
}

/// A read-only, cheaply-cloned view onto a [`CancellationTokenSource`]'s latch.
#[derive(Clone)]
pub struct CancellationToken {
    latch: Arc<Latch>,
}

/// Returned by [`CancellationToken::throw_if_cancellation_requested`].
#[derive(Debug)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

impl Default for CancellationTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationTokenSource {
    pub fn new() -> Self {
        Self {
            latch: Arc::new(Latch {
                cancelled: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    /// A cheap, shallow view onto this source. Many tokens may be cloned from one source.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            latch: Arc::clone(&self.latch),
        }
    }

    /// Request cancellation. Idempotent; wakes every waiter.
    pub fn cancel(&self) {
        let mut cancelled = self.latch.cancelled.lock().unwrap();
        *cancelled = true;
        self.latch.condvar.notify_all();
    }

    /// Clear the cancellation request so the source (and its tokens) can be reused.
    pub fn reset(&self) {
        let mut cancelled = self.latch.cancelled.lock().unwrap();
        *cancelled = false;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.latch.cancelled.lock().unwrap()
    }
}

impl CancellationToken {
    pub fn is_cancellation_requested(&self) -> bool {
        *self.latch.cancelled.lock().unwrap()
    }

    /// Block the calling thread until cancellation is requested or `timeout` elapses.
    /// Returns `true` if cancellation was observed within the timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let cancelled = self.latch.cancelled.lock().unwrap();
        if *cancelled {
            return true;
        }
        let (guard, result) = self
            .latch
            .condvar
            .wait_timeout_while(cancelled, timeout, |c| !*c)
            .unwrap();
        drop(guard);
        !result.timed_out()
    }

    /// Returns `Err(Cancelled)` if cancellation has been requested.
    pub fn throw_if_cancellation_requested(&self) -> Result<(), Cancelled> {
        if self.is_cancellation_requested() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.is_cancellation_requested()
    }
}
