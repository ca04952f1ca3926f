//! # In-flight job counter.
//!
//! [`InFlight`] counts workers that have been handed a job and not yet finished.
//! Each worker holds an [`InFlightGuard`]; the count drops when the guard does, so a
//! panicking or cancelled worker still decrements.
//!
//! Shutdown uses [`InFlight::await_drain`] to wait for zero with a deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Shared counter of executing jobs.
#[derive(Clone, Debug)]
pub struct InFlight {
    tx: Arc<watch::Sender<usize>>,
}

/// Outcome of [`InFlight::await_drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// The count reached zero.
    Drained,
    /// The deadline passed with `remaining` jobs still running.
    TimedOut { remaining: usize },
}

impl InFlight {
    /// Counter starting at zero.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Marks one job as started.
    pub fn begin(&self) -> InFlightGuard {
        self.tx.send_modify(|n| *n += 1);
        InFlightGuard {
            tx: Arc::clone(&self.tx),
        }
    }

    /// Jobs currently executing.
    pub fn count(&self) -> usize {
        *self.tx.borrow()
    }

    /// Waits until no job is executing, or `timeout` elapses.
    pub async fn await_drain(&self, timeout: Duration) -> Drain {
        let mut rx = self.tx.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0)).await {
            Ok(_) => Drain::Drained,
            Err(_) => Drain::TimedOut {
                remaining: self.count(),
            },
        }
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight count on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    tx: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tx.send_modify(|n| *n = n.saturating_sub(1));
    }
}
