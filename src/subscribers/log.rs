//! # LogWriter: failure logger
//!
//! The default subscriber: writes each failure record as one `tracing` error event.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! ERROR membervisor: notification job failed job=job-17 kind="send_invoice_email" recipient=a@example.com label="delivery_send_failed" error=mail send failed: transport: connection refused
//! ```

use async_trait::async_trait;
use tracing::error;

use super::sink::FailureRecord;
use super::subscribe::Subscribe;

/// Failure log subscriber.
#[derive(Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_failure(&self, record: &FailureRecord) {
        error!(
            job = %record.job,
            kind = record.kind.as_label(),
            recipient = %record.recipient,
            label = record.error.as_label(),
            error = %record.error,
            "notification job failed"
        );
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
