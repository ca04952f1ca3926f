use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::{
    dispatcher::Dispatcher,
    inflight::InFlight,
    pipeline::Pipeline,
    queue::NotificationQueue,
    worker::WorkerContext,
};
use crate::{
    core::Config,
    mail::{LogMailer, Mailer},
    render::{DocumentRenderer, ManualRenderer},
    subscribers::{ErrorSink, LogWriter, Subscribe, spawn_logger},
};

/// Builder for constructing a [`Pipeline`] with custom collaborators.
pub struct PipelineBuilder {
    cfg: Config,
    mailer: Arc<dyn Mailer>,
    renderer: Arc<dyn DocumentRenderer>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl PipelineBuilder {
    /// Creates a builder with the development collaborators:
    /// [`LogMailer`], [`ManualRenderer`] and a single [`LogWriter`] subscriber.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            mailer: Arc::new(LogMailer),
            renderer: Arc::new(ManualRenderer),
            subscribers: vec![Arc::new(LogWriter::new())],
        }
    }

    /// Sets the mail sender.
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Sets the document generator.
    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replaces the failure subscribers.
    ///
    /// Subscribers are driven in order by the single logger loop.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Starts the pipeline and returns its handle.
    ///
    /// Spawns the dispatcher and the logger loop, so it must be called from
    /// within a Tokio runtime.
    pub fn build(self) -> Pipeline {
        let (sink, sink_rx) = ErrorSink::channel(self.cfg.sink);
        let (job_tx, job_rx) = mpsc::channel(self.cfg.queue_capacity_clamped());
        let (stop_tx, stop_rx) = oneshot::channel();
        let inflight = InFlight::new();
        let logger_token = CancellationToken::new();

        let logger = spawn_logger(
            sink_rx,
            Arc::from(self.subscribers),
            logger_token.clone(),
        );

        let ctx = Arc::new(WorkerContext {
            mailer: self.mailer,
            renderer: self.renderer,
            sender: self.cfg.sender.clone(),
            sink: sink.clone(),
            job_timeout: self.cfg.job_timeout_opt(),
        });
        let dispatcher = tokio::spawn(
            Dispatcher::new(
                job_rx,
                ctx,
                inflight.clone(),
                self.cfg.concurrency_limit(),
                stop_rx,
            )
            .run(),
        );

        let queue = NotificationQueue::new(
            job_tx,
            self.cfg.enqueue_timeout,
            sink,
            self.cfg.manual_dir.clone(),
        );
        Pipeline::new_internal(
            self.cfg,
            queue,
            inflight,
            stop_tx,
            dispatcher,
            logger,
            logger_token,
        )
    }
}
