//! # Retry policy for serialization conflicts.
//!
//! Only `StoreError::Conflict` is retried; every other error is returned on the
//! first attempt.

use std::time::Duration;

use super::BackoffPolicy;

/// How many times `Replace` runs, and how long it sleeps between runs.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts including the first (min 1).
    pub attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    /// 3 attempts with [`BackoffPolicy::default`].
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Delay before the attempt following `attempt` (1-based), or `None`
    /// when no attempts are left.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.attempts.max(1) {
            None
        } else {
            Some(self.backoff.next(attempt.saturating_sub(1)))
        }
    }
}
