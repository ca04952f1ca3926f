//! # Bounded notification queue (producer side).
//!
//! ```text
//! request handler ──► NotificationQueue::enqueue ──► [ mpsc, capacity N ] ──► Dispatcher
//!                            │ full for `timeout` / closed
//!                            └──► Err(EnqueueError) + FailureRecord(Rejected) at the sink
//! ```
//!
//! ## Rules
//! - Admission is FIFO; the dispatcher takes jobs in the order they were admitted.
//! - `enqueue` waits at most `enqueue_timeout`; zero means a single non-blocking try.
//! - A rejected job is never silently lost: the caller gets the error and the
//!   sink gets a record.
//! - Once the dispatcher starts draining, every enqueue fails with `Closed`.
//! - Manual jobs built for this queue render under [`NotificationQueue::manual_dir`],
//!   the directory the pipeline was configured with.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tracing::{debug, warn};

use crate::error::{DeliveryError, EnqueueError};
use crate::jobs::{Envelope, JobId, NotificationJob};
use crate::subscribers::{ErrorSink, FailureRecord};

/// Cloneable producer handle.
#[derive(Clone, Debug)]
pub struct NotificationQueue {
    tx: mpsc::Sender<Envelope>,
    timeout: Duration,
    sink: ErrorSink,
    manual_dir: PathBuf,
}

impl NotificationQueue {
    pub(crate) fn new(
        tx: mpsc::Sender<Envelope>,
        timeout: Duration,
        sink: ErrorSink,
        manual_dir: PathBuf,
    ) -> Self {
        Self {
            tx,
            timeout,
            sink,
            manual_dir,
        }
    }

    /// Offers a job to the queue.
    ///
    /// Returns the assigned [`JobId`] once the job is buffered. Never runs the job.
    pub async fn enqueue(&self, job: NotificationJob) -> Result<JobId, EnqueueError> {
        let envelope = Envelope::new(job);
        let id = envelope.id;
        let kind = envelope.job.kind();

        let refused = if self.timeout.is_zero() {
            match self.tx.try_send(envelope) {
                Ok(()) => None,
                Err(TrySendError::Full(env)) => Some((
                    env,
                    EnqueueError::Rejected {
                        timeout: self.timeout,
                    },
                )),
                Err(TrySendError::Closed(env)) => Some((env, EnqueueError::Closed)),
            }
        } else {
            match self.tx.send_timeout(envelope, self.timeout).await {
                Ok(()) => None,
                Err(SendTimeoutError::Timeout(env)) => Some((
                    env,
                    EnqueueError::Rejected {
                        timeout: self.timeout,
                    },
                )),
                Err(SendTimeoutError::Closed(env)) => Some((env, EnqueueError::Closed)),
            }
        };

        match refused {
            None => {
                debug!(job = %id, kind = kind.as_label(), "job enqueued");
                Ok(id)
            }
            Some((envelope, err)) => {
                warn!(
                    job = %id,
                    kind = kind.as_label(),
                    label = err.as_label(),
                    "job not enqueued"
                );
                self.sink
                    .report(FailureRecord::new(&envelope, DeliveryError::Rejected(err)));
                Err(err)
            }
        }
    }

    /// Free slots right now (advisory).
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }

    /// Whether the dispatcher has stopped admitting jobs.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Directory manuals are rendered into.
    pub fn manual_dir(&self) -> &Path {
        &self.manual_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscribers::{Received, SinkPolicy};

    fn job(n: u32) -> NotificationJob {
        NotificationJob::raw(format!("user{n}@example.com"), "s", "b")
    }

    fn queue(tx: mpsc::Sender<Envelope>, timeout: Duration, sink: ErrorSink) -> NotificationQueue {
        NotificationQueue::new(tx, timeout, sink, PathBuf::from("/tmp/manuals"))
    }

    #[tokio::test]
    async fn full_queue_with_zero_timeout_rejects_immediately() {
        let (tx, _rx) = mpsc::channel(1);
        let (sink, mut sink_rx) = ErrorSink::channel(SinkPolicy::Unbounded);
        let queue = queue(tx, Duration::ZERO, sink);

        queue.enqueue(job(1)).await.unwrap();
        let started = std::time::Instant::now();
        let err = queue.enqueue(job(2)).await.unwrap_err();

        assert_eq!(err, EnqueueError::Rejected { timeout: Duration::ZERO });
        assert!(started.elapsed() < Duration::from_millis(50));
        let Received::Record(record) = sink_rx.try_recv() else {
            panic!("rejection must be recorded");
        };
        assert_eq!(record.recipient, "user2@example.com");
        assert_eq!(record.error, DeliveryError::Rejected(err));
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_waits_for_the_timeout() {
        let (tx, _rx) = mpsc::channel(1);
        let (sink, _sink_rx) = ErrorSink::channel(SinkPolicy::Unbounded);
        let queue = queue(tx, Duration::from_millis(250), sink);

        queue.enqueue(job(1)).await.unwrap();
        let started = tokio::time::Instant::now();
        let err = queue.enqueue(job(2)).await.unwrap_err();
        assert!(matches!(err, EnqueueError::Rejected { .. }));
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn closed_queue_reports_closed() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let (sink, _sink_rx) = ErrorSink::channel(SinkPolicy::Unbounded);
        let queue = queue(tx, Duration::from_millis(10), sink);

        assert_eq!(queue.enqueue(job(1)).await, Err(EnqueueError::Closed));
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn admitted_jobs_keep_fifo_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let (sink, _sink_rx) = ErrorSink::channel(SinkPolicy::Unbounded);
        let queue = queue(tx, Duration::ZERO, sink);

        let a = queue.enqueue(job(1)).await.unwrap();
        let b = queue.enqueue(job(2)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().id, a);
        assert_eq!(rx.recv().await.unwrap().id, b);
    }

    #[test]
    fn clones_share_the_manual_dir() {
        let (tx, _rx) = mpsc::channel(1);
        let (sink, _sink_rx) = ErrorSink::channel(SinkPolicy::Unbounded);
        let queue = queue(tx, Duration::ZERO, sink);
        assert_eq!(queue.clone().manual_dir(), Path::new("/tmp/manuals"));
    }
}
