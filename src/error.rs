//! Error types used by the fulfilment pipeline and the subscription store.
//!
//! This module defines the error enums seen by callers:
//!
//! - [`StoreError`]: raised synchronously by [`SubscriptionStore`](crate::SubscriptionStore).
//! - [`EnqueueError`]: raised synchronously by [`NotificationQueue::enqueue`](crate::NotificationQueue::enqueue).
//! - [`DeliveryError`]: terminal failures of a notification job, recorded at the error sink only.
//! - [`RuntimeError`]: failures of the pipeline runtime itself (shutdown grace exceeded).
//! - [`ConfigError`]: invalid environment configuration.
//!
//! Every enum provides `as_label` (stable snake_case for logs/metrics).

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the subscription store.
///
/// `Replace` errors propagate to the request handler, which must not treat the
/// subscription as changed unless `Replace` returned `Ok`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Referenced plan (or other entity) does not exist. User-correctable.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind (`"plan"`, ...).
        entity: &'static str,
        /// Identifier that was looked up.
        id: i64,
    },

    /// Transaction lost a serialization race. Safe to retry.
    #[error("serialization conflict: {details}")]
    Conflict {
        /// Backend-specific description.
        details: String,
    },

    /// Storage unreachable or failing. Surfaced to the caller, never retried internally.
    #[error("storage unavailable: {details}")]
    Unavailable {
        /// Backend-specific description.
        details: String,
    },
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use membervisor::StoreError;
    ///
    /// let err = StoreError::NotFound { entity: "plan", id: 7 };
    /// assert_eq!(err.as_label(), "store_not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "store_not_found",
            StoreError::Conflict { .. } => "store_conflict",
            StoreError::Unavailable { .. } => "store_unavailable",
        }
    }

    /// Indicates whether the failed operation is safe to retry.
    ///
    /// Only [`StoreError::Conflict`] is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub(crate) fn unavailable(details: impl Into<String>) -> Self {
        StoreError::Unavailable {
            details: details.into(),
        }
    }

    pub(crate) fn conflict(details: impl Into<String>) -> Self {
        StoreError::Conflict {
            details: details.into(),
        }
    }
}

/// # Enqueue rejection.
///
/// Returned synchronously to the producer so the request path can degrade
/// (for example skip a non-critical notification). The rejected job is also
/// recorded at the error sink.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Queue stayed full for the whole enqueue timeout (zero = single try).
    #[error("notification queue full (waited {timeout:?})")]
    Rejected {
        /// The enqueue timeout that elapsed.
        timeout: Duration,
    },

    /// Dispatcher is draining or gone; no more jobs are admitted.
    #[error("notification queue closed")]
    Closed,
}

impl EnqueueError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EnqueueError::Rejected { .. } => "enqueue_rejected",
            EnqueueError::Closed => "enqueue_closed",
        }
    }
}

/// # Terminal failure of a notification job.
///
/// Never propagated to an HTTP response; recorded once at the error sink and logged.
/// No variant is retried.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Invoice could not be produced from the plan snapshot.
    #[error("invoice generation failed: {error}")]
    Invoice {
        /// The underlying error message.
        error: String,
    },

    /// Document generator failed; the email was not attempted.
    #[error("document generation failed: {error}")]
    Render {
        /// The underlying error message.
        error: String,
    },

    /// Mail sender failed.
    #[error("mail send failed: {error}")]
    Send {
        /// The underlying error message.
        error: String,
    },

    /// Job exceeded the configured per-job timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// Job logic panicked; the panic was contained in the worker.
    #[error("worker panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },

    /// Job never reached the queue.
    #[error("not enqueued: {0}")]
    Rejected(EnqueueError),

    /// Job was still buffered when the shutdown deadline passed.
    #[error("not dispatched before the shutdown deadline")]
    Abandoned,
}

impl DeliveryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use membervisor::DeliveryError;
    ///
    /// let err = DeliveryError::Send { error: "connection refused".into() };
    /// assert_eq!(err.as_label(), "delivery_send_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DeliveryError::Invoice { .. } => "delivery_invoice_failed",
            DeliveryError::Render { .. } => "delivery_render_failed",
            DeliveryError::Send { .. } => "delivery_send_failed",
            DeliveryError::Timeout { .. } => "delivery_timeout",
            DeliveryError::Panicked { .. } => "delivery_panicked",
            DeliveryError::Rejected(e) => e.as_label(),
            DeliveryError::Abandoned => "delivery_abandoned",
        }
    }
}

/// # Errors produced by the pipeline runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown timeout elapsed with workers still running; the process exits regardless.
    #[error("shutdown timeout {grace:?} exceeded; {in_flight} job(s) still in flight; forcing exit")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Workers that had not finished.
        in_flight: usize,
    },

    /// OS signal listeners could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use membervisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), in_flight: 2 };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

/// # Configuration errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable was set but could not be parsed.
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value found in the environment.
        value: String,
        /// What was expected.
        reason: &'static str,
    },
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_info(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
