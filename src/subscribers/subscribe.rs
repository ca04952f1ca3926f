//! # Failure subscriber trait
//!
//! `Subscribe` is the extension point for reacting to failure records drained from
//! the error sink. All subscribers are driven by the single logger loop, in order,
//! once per record.
//!
//! ## Contract
//! - Subscribers only observe; they must not retry or re-enqueue the job.
//! - A panicking subscriber is contained (logged) and does not stop the loop.
//! - Slow subscribers delay the loop; under `SinkPolicy::DropOldest` that means
//!   older records may be dropped.
//!
//! ## Example (skeleton)
//! ```rust
//! // use membervisor::{FailureRecord, Subscribe};
//! //
//! // struct Alerts;
//! // #[async_trait::async_trait]
//! // impl Subscribe for Alerts {
//! //     async fn on_failure(&self, record: &FailureRecord) {
//! //         // page someone...
//! //     }
//! //     fn name(&self) -> &'static str { "alerts" }
//! // }
//! ```

use async_trait::async_trait;

use super::sink::FailureRecord;

/// Contract for failure subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single failure record.
    async fn on_failure(&self, record: &FailureRecord);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
