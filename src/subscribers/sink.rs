//! # Error sink: the channel asynchronous job failures flow through.
//!
//! [`ErrorSink`] is the producer handle (cheap to clone, shared by the queue and
//! every worker). [`SinkReceiver`] is owned by exactly one logger loop for the
//! process lifetime.
//!
//! ## Buffering policy
//! The policy is an explicit choice made at construction time ([`SinkPolicy`]):
//! - `Unbounded`: `tokio::sync::mpsc::unbounded_channel`; producers never block,
//!   nothing is dropped, memory grows if the logger lags.
//! - `DropOldest(n)`: `tokio::sync::broadcast` ring of `n` records; producers never
//!   block, a lagging logger observes `Received::Dropped(k)` and the `k` oldest
//!   records are lost (counted in [`SinkStats`](crate::SinkStats)).
//!
//! ```text
//! queue (rejections) ──┐
//! worker 1 ────────────┼──► ErrorSink ──► SinkReceiver ──► logger loop ──► Subscribe::on_failure
//! worker N ────────────┘    (policy)       (one owner)
//! ```
//!
//! In both modes `report` is synchronous and never waits.

use std::time::SystemTime;

use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::error::DeliveryError;
use crate::jobs::{Envelope, JobId, JobKind};

/// Buffering discipline of the error sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkPolicy {
    /// Never drop, never block; the buffer grows without bound.
    #[default]
    Unbounded,

    /// Keep at most `n` undelivered records (min 1, rounded up to a power of two by
    /// the ring buffer); overwrite the oldest on overflow.
    DropOldest(usize),
}

/// One failed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Identity of the originating job.
    pub job: JobId,
    pub kind: JobKind,
    pub recipient: String,
    pub error: DeliveryError,
    /// Wall-clock time of the failure.
    pub at: SystemTime,
}

impl FailureRecord {
    pub(crate) fn new(envelope: &Envelope, error: DeliveryError) -> Self {
        Self {
            job: envelope.id,
            kind: envelope.job.kind(),
            recipient: envelope.job.recipient().to_string(),
            error,
            at: SystemTime::now(),
        }
    }
}

#[derive(Clone, Debug)]
enum SinkTx {
    Unbounded(mpsc::UnboundedSender<FailureRecord>),
    DropOldest(broadcast::Sender<FailureRecord>),
}

/// Producer side of the error sink.
#[derive(Clone, Debug)]
pub struct ErrorSink {
    tx: SinkTx,
}

impl ErrorSink {
    /// Creates a sink with the given policy and its single receiver.
    pub fn channel(policy: SinkPolicy) -> (ErrorSink, SinkReceiver) {
        match policy {
            SinkPolicy::Unbounded => {
                let (tx, rx) = mpsc::unbounded_channel();
                (
                    ErrorSink {
                        tx: SinkTx::Unbounded(tx),
                    },
                    SinkReceiver {
                        rx: SinkRx::Unbounded(rx),
                    },
                )
            }
            SinkPolicy::DropOldest(capacity) => {
                let (tx, rx) = broadcast::channel(capacity.max(1));
                (
                    ErrorSink {
                        tx: SinkTx::DropOldest(tx),
                    },
                    SinkReceiver {
                        rx: SinkRx::DropOldest(rx),
                    },
                )
            }
        }
    }

    /// Records a failure. Never blocks.
    ///
    /// If the logger loop is already gone the record is logged here instead, so a
    /// late failure is still visible.
    pub fn report(&self, record: FailureRecord) {
        let undelivered = match &self.tx {
            SinkTx::Unbounded(tx) => tx.send(record).err().map(|e| e.0),
            SinkTx::DropOldest(tx) => tx.send(record).err().map(|e| e.0),
        };
        if let Some(record) = undelivered {
            warn!(
                job = %record.job,
                kind = record.kind.as_label(),
                label = record.error.as_label(),
                error = %record.error,
                "error sink closed; failure logged directly"
            );
        }
    }
}

enum SinkRx {
    Unbounded(mpsc::UnboundedReceiver<FailureRecord>),
    DropOldest(broadcast::Receiver<FailureRecord>),
}

/// Outcome of reading from the sink.
#[derive(Debug)]
pub enum Received {
    Record(FailureRecord),
    /// `DropOldest` only: this many records were overwritten before being read.
    Dropped(u64),
    /// Nothing buffered right now (`try_recv` only).
    Empty,
    /// Every producer is gone and the buffer is empty.
    Closed,
}

/// Consumer side of the error sink.
pub struct SinkReceiver {
    rx: SinkRx,
}

impl SinkReceiver {
    /// Waits for the next record (never returns [`Received::Empty`]).
    pub async fn recv(&mut self) -> Received {
        match &mut self.rx {
            SinkRx::Unbounded(rx) => match rx.recv().await {
                Some(record) => Received::Record(record),
                None => Received::Closed,
            },
            SinkRx::DropOldest(rx) => match rx.recv().await {
                Ok(record) => Received::Record(record),
                Err(broadcast::error::RecvError::Lagged(n)) => Received::Dropped(n),
                Err(broadcast::error::RecvError::Closed) => Received::Closed,
            },
        }
    }

    /// Returns what is immediately available.
    pub fn try_recv(&mut self) -> Received {
        match &mut self.rx {
            SinkRx::Unbounded(rx) => match rx.try_recv() {
                Ok(record) => Received::Record(record),
                Err(mpsc::error::TryRecvError::Empty) => Received::Empty,
                Err(mpsc::error::TryRecvError::Disconnected) => Received::Closed,
            },
            SinkRx::DropOldest(rx) => match rx.try_recv() {
                Ok(record) => Received::Record(record),
                Err(broadcast::error::TryRecvError::Lagged(n)) => Received::Dropped(n),
                Err(broadcast::error::TryRecvError::Empty) => Received::Empty,
                Err(broadcast::error::TryRecvError::Closed) => Received::Closed,
            },
        }
    }
}
