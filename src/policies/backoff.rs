//! # Backoff between `Replace` attempts.
//!
//! The delay before retry `n` (0-indexed) is `first × factor^n`, capped at `max`,
//! then jittered. The base is derived from the attempt number alone, so jitter
//! never compounds across attempts.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use membervisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(20),
//!     max: Duration::from_millis(500),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(20));
//! assert_eq!(backoff.next(2), Duration::from_millis(80));
//! assert_eq!(backoff.next(10), Duration::from_millis(500));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Exponential backoff with a cap.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound on any delay.
    pub max: Duration,
    /// Growth factor per attempt (`>= 1.0`).
    pub factor: f64,
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 20ms`, `factor = 2.0`, `max = 500ms`, `jitter = Equal`.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(20),
            max: Duration::from_millis(500),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: JitterPolicy) -> BackoffPolicy {
        BackoffPolicy {
            jitter,
            ..BackoffPolicy::default()
        }
    }

    #[test]
    fn doubles_until_cap() {
        let p = policy(JitterPolicy::None);
        let delays: Vec<_> = (0..7).map(|n| p.next(n).as_millis()).collect();
        assert_eq!(delays, vec![20, 40, 80, 160, 320, 500, 500]);
    }

    #[test]
    fn overflowing_exponent_clamps_to_max() {
        assert_eq!(policy(JitterPolicy::None).next(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn first_above_max_is_capped() {
        let p = BackoffPolicy {
            first: Duration::from_secs(2),
            ..policy(JitterPolicy::None)
        };
        assert_eq!(p.next(0), Duration::from_millis(500));
    }

    #[test]
    fn jitter_applies_to_capped_base() {
        let p = policy(JitterPolicy::Equal);
        for n in 0..12 {
            let d = p.next(n);
            assert!(d <= Duration::from_millis(500), "attempt {n}: {d:?}");
        }
    }
}
