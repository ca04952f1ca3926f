//! Retry policies for the subscription store.
//!
//! `Replace` may lose a serialization race against a concurrent `Replace` for the
//! same user. These knobs decide **whether** it tries again and **how long** it
//! waits first.
//!
//! ## Contents
//! - [`RetryPolicy`] total attempts plus backoff
//! - [`BackoffPolicy`] how delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`] randomization so racing retries do not collide again
//!
//! ## Defaults
//! - `RetryPolicy::default()` → 3 attempts.
//! - `BackoffPolicy::default()` → first=20ms, factor=2.0, max=500ms, jitter=Equal.
//!
//! Notification jobs are never retried; these policies apply to the store only.

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
