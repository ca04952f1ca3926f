//! # Pipeline configuration.
//!
//! Provides [`Config`], the settings for the notification pipeline.
//!
//! Config is built in two ways:
//! 1. **In code**: `Config::default()` and field overrides.
//! 2. **From the environment**: [`Config::from_env`] reads `NOTIFY_*`, `SENDER_*`
//!    and `MANUAL_DIR`; unset or blank variables keep their defaults.
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (no semaphore created)
//! - `job_timeout = 0s` → no per-job timeout
//! - `enqueue_timeout = 0s` → enqueue tries once and rejects immediately when full

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::mail::Mailbox;
use crate::subscribers::SinkPolicy;

/// Configuration for the notification pipeline.
///
/// ## Field semantics
/// - `queue_capacity`: bounded queue size (min 1; clamped)
/// - `enqueue_timeout`: how long a producer waits for a free slot
/// - `grace`: how long shutdown waits for in-flight jobs
/// - `max_concurrent`: concurrent job limit (`0` = unlimited)
/// - `job_timeout`: per-job timeout (`0s` = none)
/// - `sink`: error sink buffering policy
/// - `sender`: `From` identity of every outbound email
/// - `manual_dir`: where manuals are rendered before being attached
#[derive(Clone, Debug)]
pub struct Config {
    /// Queue capacity. Producers see backpressure once this many jobs wait.
    pub queue_capacity: usize,

    /// Maximum time `enqueue` waits for space before rejecting.
    pub enqueue_timeout: Duration,

    /// Maximum time shutdown waits for in-flight jobs before forcing exit.
    pub grace: Duration,

    /// Maximum number of jobs executing at once.
    ///
    /// - `0` = unlimited (no semaphore)
    /// - `n > 0` = at most `n` workers run simultaneously
    pub max_concurrent: usize,

    /// Per-job timeout. `Duration::ZERO` disables it.
    pub job_timeout: Duration,

    /// Error sink buffering policy.
    pub sink: SinkPolicy,

    /// Sender identity used for every message.
    pub sender: Mailbox,

    /// Directory generated manuals are written to.
    pub manual_dir: PathBuf,
}

impl Config {
    /// Returns the concurrency limit as an `Option`.
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns the per-job timeout as an `Option`.
    #[inline]
    pub fn job_timeout_opt(&self) -> Option<Duration> {
        if self.job_timeout == Duration::ZERO {
            None
        } else {
            Some(self.job_timeout)
        }
    }

    /// Returns the queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Reads configuration from process environment variables.
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `NOTIFY_QUEUE_CAPACITY` | queue capacity |
    /// | `NOTIFY_ENQUEUE_TIMEOUT_MS` | enqueue timeout, milliseconds |
    /// | `NOTIFY_SHUTDOWN_GRACE_SECS` | shutdown grace, seconds |
    /// | `NOTIFY_MAX_CONCURRENT` | concurrent jobs (`0` = unlimited) |
    /// | `NOTIFY_JOB_TIMEOUT_SECS` | per-job timeout (`0` = none) |
    /// | `NOTIFY_ERROR_SINK` | `unbounded` or `drop-oldest:N` |
    /// | `SENDER_NAME`, `SENDER_EMAIL` | sender identity |
    /// | `MANUAL_DIR` | manual output directory |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(optional_env)
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut cfg = Config::default();

        if let Some(v) = lookup("NOTIFY_QUEUE_CAPACITY") {
            cfg.queue_capacity = parse_number("NOTIFY_QUEUE_CAPACITY", v)?;
        }
        if let Some(v) = lookup("NOTIFY_ENQUEUE_TIMEOUT_MS") {
            cfg.enqueue_timeout =
                Duration::from_millis(parse_number("NOTIFY_ENQUEUE_TIMEOUT_MS", v)?);
        }
        if let Some(v) = lookup("NOTIFY_SHUTDOWN_GRACE_SECS") {
            cfg.grace = Duration::from_secs(parse_number("NOTIFY_SHUTDOWN_GRACE_SECS", v)?);
        }
        if let Some(v) = lookup("NOTIFY_MAX_CONCURRENT") {
            cfg.max_concurrent = parse_number("NOTIFY_MAX_CONCURRENT", v)?;
        }
        if let Some(v) = lookup("NOTIFY_JOB_TIMEOUT_SECS") {
            cfg.job_timeout = Duration::from_secs(parse_number("NOTIFY_JOB_TIMEOUT_SECS", v)?);
        }
        if let Some(v) = lookup("NOTIFY_ERROR_SINK") {
            cfg.sink = parse_sink(v)?;
        }
        if let Some(v) = lookup("SENDER_NAME") {
            cfg.sender.name = v;
        }
        if let Some(v) = lookup("SENDER_EMAIL") {
            if !v.contains('@') {
                return Err(ConfigError::Invalid {
                    key: "SENDER_EMAIL",
                    value: v,
                    reason: "expected an email address",
                });
            }
            cfg.sender.email = v;
        }
        if let Some(v) = lookup("MANUAL_DIR") {
            cfg.manual_dir = PathBuf::from(v);
        }
        Ok(cfg)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `queue_capacity = 100`
    /// - `enqueue_timeout = 250ms`
    /// - `grace = 30s`
    /// - `max_concurrent = 16`
    /// - `job_timeout = 60s`
    /// - `sink = SinkPolicy::Unbounded`
    /// - `sender = "Membership" <noreply@example.com>`
    /// - `manual_dir = ./tmp`
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            enqueue_timeout: Duration::from_millis(250),
            grace: Duration::from_secs(30),
            max_concurrent: 16,
            job_timeout: Duration::from_secs(60),
            sink: SinkPolicy::Unbounded,
            sender: Mailbox::new("Membership", "noreply@example.com"),
            manual_dir: PathBuf::from("./tmp"),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|v| {
        let v = v.trim().to_string();
        if v.is_empty() { None } else { Some(v) }
    })
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        key,
        value,
        reason: "expected a non-negative integer",
    })
}

fn parse_sink(value: String) -> Result<SinkPolicy, ConfigError> {
    if value.eq_ignore_ascii_case("unbounded") {
        return Ok(SinkPolicy::Unbounded);
    }
    if let Some(n) = value.strip_prefix("drop-oldest:")
        && let Ok(n) = n.parse::<usize>()
        && n > 0
    {
        return Ok(SinkPolicy::DropOldest(n));
    }
    Err(ConfigError::Invalid {
        key: "NOTIFY_ERROR_SINK",
        value,
        reason: "expected `unbounded` or `drop-oldest:N` with N > 0",
    })
}
