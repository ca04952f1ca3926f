//! # In-memory failure recorder.
//!
//! Keeps every failure record it is handed, in arrival order. Useful for admin
//! endpoints ("what failed since boot") and for tests that need to await a
//! specific number of failures.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};

use super::sink::FailureRecord;
use super::subscribe::Subscribe;

/// Subscriber that stores failure records in memory.
#[derive(Debug, Default)]
pub struct FailureLog {
    records: RwLock<Vec<FailureRecord>>,
    changed: Notify,
}

impl FailureLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record received so far.
    pub async fn snapshot(&self) -> Vec<FailureRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Waits until at least `n` records are stored.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.len().await >= n {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[async_trait]
impl Subscribe for FailureLog {
    async fn on_failure(&self, record: &FailureRecord) {
        self.records.write().await.push(record.clone());
        self.changed.notify_waiters();
    }

    fn name(&self) -> &'static str {
        "FailureLog"
    }
}
