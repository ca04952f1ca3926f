//! # Logger loop: the single consumer of the error sink.
//!
//! ```text
//! SinkReceiver ──► logger loop ──► sub1.on_failure()
//!                      │     └───► sub2.on_failure()   (in order, one record at a time)
//!                      └──► Dropped(k) → warn + SinkStats.dropped += k
//! ```
//!
//! ## Rules
//! - Exactly one loop owns the receiver for the lifetime of the pipeline.
//! - Subscribers see records in sink order.
//! - A panicking subscriber is logged and skipped; the loop keeps going.
//! - On cancellation the loop drains whatever is already buffered, then exits.

use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::sink::{FailureRecord, Received, SinkReceiver};
use super::subscribe::Subscribe;
use crate::error::panic_info;

/// Counters reported by the logger loop when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Records delivered to subscribers.
    pub recorded: u64,
    /// Records overwritten before they were read (`DropOldest` only).
    pub dropped: u64,
}

/// Spawns the logger loop.
///
/// The loop ends when every producer is gone or `token` is cancelled,
/// and returns its counters.
pub(crate) fn spawn_logger(
    mut rx: SinkReceiver,
    subs: Arc<[Arc<dyn Subscribe>]>,
    token: CancellationToken,
) -> JoinHandle<SinkStats> {
    tokio::spawn(async move {
        let mut stats = SinkStats::default();
        loop {
            tokio::select! {
                biased;
                received = rx.recv() => {
                    if !handle(received, &subs, &mut stats).await {
                        break;
                    }
                }
                _ = token.cancelled() => {
                    loop {
                        let received = rx.try_recv();
                        if matches!(received, Received::Empty | Received::Closed) {
                            break;
                        }
                        handle(received, &subs, &mut stats).await;
                    }
                    break;
                }
            }
        }
        debug!(
            recorded = stats.recorded,
            dropped = stats.dropped,
            "failure logger stopped"
        );
        stats
    })
}

/// Returns `false` once the sink is closed.
async fn handle(received: Received, subs: &[Arc<dyn Subscribe>], stats: &mut SinkStats) -> bool {
    match received {
        Received::Record(record) => {
            deliver(subs, &record).await;
            stats.recorded += 1;
            true
        }
        Received::Dropped(n) => {
            stats.dropped += n;
            warn!(dropped = n, "error sink overflow; oldest failure records lost");
            true
        }
        Received::Empty => true,
        Received::Closed => false,
    }
}

async fn deliver(subs: &[Arc<dyn Subscribe>], record: &FailureRecord) {
    for sub in subs {
        let fut = sub.on_failure(record);
        if let Err(payload) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            error!(
                subscriber = sub.name(),
                job = %record.job,
                info = %panic_info(&*payload),
                "failure subscriber panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::jobs::{Envelope, NotificationJob};
    use crate::subscribers::{ErrorSink, FailureLog, SinkPolicy};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Explodes;

    #[async_trait]
    impl Subscribe for Explodes {
        async fn on_failure(&self, _record: &FailureRecord) {
            panic!("boom");
        }
    }

    fn record() -> FailureRecord {
        let env = Envelope::new(NotificationJob::raw("a@example.com", "s", "b"));
        FailureRecord::new(&env, DeliveryError::Abandoned)
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_stop_delivery() {
        let (sink, rx) = ErrorSink::channel(SinkPolicy::Unbounded);
        let log = Arc::new(FailureLog::new());
        let subs: Arc<[Arc<dyn Subscribe>]> = Arc::from(vec![
            Arc::new(Explodes) as Arc<dyn Subscribe>,
            log.clone() as Arc<dyn Subscribe>,
        ]);
        let handle = spawn_logger(rx, subs, CancellationToken::new());

        sink.report(record());
        sink.report(record());
        drop(sink);

        let stats = handle.await.unwrap();
        assert_eq!(stats.recorded, 2);
        assert_eq!(log.len().await, 2);
    }

    #[tokio::test]
    async fn cancellation_flushes_buffered_records() {
        let (sink, rx) = ErrorSink::channel(SinkPolicy::DropOldest(8));
        let log = Arc::new(FailureLog::new());
        let subs: Arc<[Arc<dyn Subscribe>]> = Arc::from(vec![log.clone() as Arc<dyn Subscribe>]);
        let token = CancellationToken::new();
        let handle = spawn_logger(rx, subs, token.clone());

        sink.report(record());
        assert!(log.wait_for(1, Duration::from_secs(1)).await);
        sink.report(record());
        token.cancel();

        let stats = handle.await.unwrap();
        assert_eq!(stats.recorded, 2);
        assert_eq!(stats.dropped, 0);
    }
}
