//! Runtime core: queue, dispatcher, workers and shutdown.
//!
//! The public API from this module is [`Pipeline`] (plus its builder and
//! configuration) and the producer handle [`NotificationQueue`].
//!
//! Internal modules:
//! - [`queue`]: bounded producer handle with enqueue timeout and rejection reporting;
//! - [`dispatcher`]: Running/Draining job loop, concurrency limit, bounded drain at shutdown;
//! - [`worker`]: executes one job (invoice, raw email, manual render + send + cleanup);
//! - [`inflight`]: in-flight counter with drop guard and bounded drain wait;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod config;
mod dispatcher;
mod inflight;
mod pipeline;
mod queue;
mod shutdown;
mod worker;

pub use builder::PipelineBuilder;
pub use config::Config;
pub use dispatcher::DispatchReport;
pub use inflight::{Drain, InFlight, InFlightGuard};
pub use pipeline::{Pipeline, ShutdownReport};
pub use queue::NotificationQueue;
pub use shutdown::wait_for_shutdown_signal;
pub use worker::{MANUAL_BODY, MANUAL_SUBJECT};
