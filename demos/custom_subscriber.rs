//! # Example: custom_subscriber
//!
//! Attach a custom failure subscriber next to the in-memory [`FailureLog`].
//!
//! Shows how to:
//! - Implement the [`Subscribe`] trait.
//! - Plug a failing [`Mailer`] in through [`Pipeline::builder`].
//! - Read failures back from [`FailureLog`] and the [`ShutdownReport`].
//!
//! ## Run
//! ```bash
//! cargo run --example custom_subscriber
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use membervisor::{
    Config, FailureLog, FailureRecord, MailError, Mailer, Message, NotificationJob, Pipeline,
    Subscribe,
};
use tracing::info;

/// Counts failures per call; a real one would export metrics or page someone.
#[derive(Default)]
struct Counter {
    failures: AtomicU64,
}

#[async_trait]
impl Subscribe for Counter {
    async fn on_failure(&self, record: &FailureRecord) {
        let n = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        info!(n, job = %record.job, label = record.error.as_label(), "counted failure");
    }

    fn name(&self) -> &'static str {
        "counter"
    }
}

/// Refuses every message.
struct Offline;

#[async_trait]
impl Mailer for Offline {
    async fn send(&self, _message: &Message) -> Result<(), MailError> {
        Err(MailError::Transport("smtp relay unreachable".into()))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let counter = Arc::new(Counter::default());
    let log = Arc::new(FailureLog::new());
    let pipeline = Pipeline::builder(Config::default())
        .with_mailer(Arc::new(Offline))
        .with_subscribers(vec![
            counter.clone() as Arc<dyn Subscribe>,
            log.clone() as Arc<dyn Subscribe>,
        ])
        .build();

    for n in 0..3 {
        let job = NotificationJob::raw(format!("user{n}@example.com"), "Welcome", "Hello!");
        if let Err(e) = pipeline.enqueue(job).await {
            info!(error = %e, "not enqueued");
        }
    }

    log.wait_for(3, Duration::from_secs(5)).await;
    let report = pipeline.shutdown_with_report(Duration::from_secs(5)).await;

    info!(
        recorded = log.len().await,
        counted = counter.failures.load(Ordering::Relaxed),
        drained = report.drained,
        "done"
    );
}
