//! # Failure reporting.
//!
//! Asynchronous job failures never reach the request that created the job. They are
//! reported to the [`ErrorSink`], drained by one logger loop and handed to each
//! [`Subscribe`] implementation in turn.
//!
//! - [`ErrorSink`] / [`SinkReceiver`] / [`SinkPolicy`]: the channel and its buffering policy.
//! - [`Subscribe`]: extension point for reacting to failures.
//! - [`LogWriter`]: default subscriber, one `tracing` error event per failure.
//! - [`FailureLog`]: in-memory recorder.
//! - [`SinkStats`]: counters returned by the logger loop at shutdown.

mod failure_log;
mod log;
mod logger;
mod sink;
mod subscribe;

pub use failure_log::FailureLog;
pub use log::LogWriter;
pub use logger::SinkStats;
pub(crate) use logger::spawn_logger;
pub use sink::{ErrorSink, FailureRecord, Received, SinkPolicy, SinkReceiver};
pub use subscribe::Subscribe;
