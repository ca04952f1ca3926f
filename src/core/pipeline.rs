//! # Pipeline: handle to the running notification runtime.
//!
//! [`Pipeline`] owns the dispatcher task, the logger loop and the producer side of
//! the queue. Request handlers get a cloned [`NotificationQueue`] via
//! [`Pipeline::queue`]; process shutdown goes through [`Pipeline::shutdown`] or
//! [`Pipeline::run_until_signal`].
//!
//! ## Shutdown sequence
//! ```text
//! shutdown(timeout)
//!   ├─► dispatcher: Running → Draining (queue closed, buffered jobs dispatched)
//!   ├─► await_drain(rest of timeout)   (in-flight workers finish or time out)
//!   ├─► logger: cancel → flush buffered failure records → SinkStats
//!   └─► ShutdownReport { drained, .. }
//! ```
//!
//! Shutdown is idempotent: later calls return the first report.
//! Dropping the pipeline without calling shutdown stops the dispatcher with zero grace.

use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{
    Config,
    builder::PipelineBuilder,
    dispatcher::DispatchReport,
    inflight::InFlight,
    queue::NotificationQueue,
    shutdown::wait_for_shutdown_signal,
};
use crate::error::{EnqueueError, RuntimeError};
use crate::jobs::{JobId, NotificationJob};
use crate::subscribers::SinkStats;

/// Outcome of a pipeline shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every accepted job was dispatched and finished before the timeout.
    pub drained: bool,
    /// Jobs handed to workers over the pipeline lifetime.
    pub dispatched: u64,
    /// Jobs still queued when the timeout passed.
    pub abandoned: u64,
    /// Jobs still running when shutdown returned.
    pub in_flight: usize,
    /// Error sink counters.
    pub sink: SinkStats,
}

enum Lifecycle {
    Running {
        stop: oneshot::Sender<Duration>,
        dispatcher: JoinHandle<DispatchReport>,
        logger: JoinHandle<SinkStats>,
    },
    Stopped(ShutdownReport),
}

/// Handle to a running notification pipeline.
pub struct Pipeline {
    cfg: Config,
    queue: NotificationQueue,
    inflight: InFlight,
    logger_token: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl Pipeline {
    /// Returns a builder for `cfg`.
    pub fn builder(cfg: Config) -> PipelineBuilder {
        PipelineBuilder::new(cfg)
    }

    /// Starts a pipeline with the default collaborators.
    pub fn start(cfg: Config) -> Self {
        PipelineBuilder::new(cfg).build()
    }

    pub(super) fn new_internal(
        cfg: Config,
        queue: NotificationQueue,
        inflight: InFlight,
        stop: oneshot::Sender<Duration>,
        dispatcher: JoinHandle<DispatchReport>,
        logger: JoinHandle<SinkStats>,
        logger_token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            queue,
            inflight,
            logger_token,
            lifecycle: Mutex::new(Lifecycle::Running {
                stop,
                dispatcher,
                logger,
            }),
        }
    }

    /// Configuration the pipeline was started with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Producer handle for request handlers.
    pub fn queue(&self) -> NotificationQueue {
        self.queue.clone()
    }

    /// Shorthand for `self.queue().enqueue(job)`.
    pub async fn enqueue(&self, job: NotificationJob) -> Result<JobId, EnqueueError> {
        self.queue.enqueue(job).await
    }

    /// Jobs executing right now.
    pub fn in_flight(&self) -> usize {
        self.inflight.count()
    }

    /// Stops admission and waits up to `timeout` for in-flight jobs.
    ///
    /// Returns `true` when everything finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.shutdown_with_report(timeout).await.drained
    }

    /// Like [`shutdown`](Self::shutdown), returning the full report.
    pub async fn shutdown_with_report(&self, timeout: Duration) -> ShutdownReport {
        let mut lifecycle = self.lifecycle.lock().await;
        let current = std::mem::replace(
            &mut *lifecycle,
            Lifecycle::Stopped(ShutdownReport::default()),
        );
        let (stop, dispatcher, logger) = match current {
            Lifecycle::Running {
                stop,
                dispatcher,
                logger,
            } => (stop, dispatcher, logger),
            Lifecycle::Stopped(report) => {
                *lifecycle = Lifecycle::Stopped(report);
                return report;
            }
        };

        info!(timeout_ms = timeout.as_millis() as u64, "pipeline shutting down");
        let _ = stop.send(timeout);

        let dispatch = match dispatcher.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "dispatcher task failed");
                DispatchReport {
                    in_flight: self.inflight.count(),
                    ..DispatchReport::default()
                }
            }
        };

        self.logger_token.cancel();
        let sink = match logger.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "failure logger task failed");
                SinkStats::default()
            }
        };

        let report = ShutdownReport {
            drained: dispatch.drained,
            dispatched: dispatch.dispatched,
            abandoned: dispatch.abandoned,
            in_flight: dispatch.in_flight,
            sink,
        };
        *lifecycle = Lifecycle::Stopped(report);
        report
    }

    /// Waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), then shuts down with
    /// the configured grace.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] when jobs were still running or never
    /// dispatched at the deadline; the caller should exit anyway.
    pub async fn run_until_signal(&self) -> Result<ShutdownReport, RuntimeError> {
        wait_for_shutdown_signal().await?;
        let grace = self.cfg.grace;
        let report = self.shutdown_with_report(grace).await;
        if report.drained {
            Ok(report)
        } else {
            warn!(
                in_flight = report.in_flight,
                abandoned = report.abandoned,
                "exiting with unfinished notification jobs"
            );
            Err(RuntimeError::GraceExceeded {
                grace,
                in_flight: report.in_flight,
            })
        }
    }
}
