//! # Dispatcher: the job loop.
//!
//! Drains the notification queue and spawns one worker task per job.
//!
//! ## States
//! ```text
//!            ┌──────────── Running ─────────────┐
//!            │ permit ← semaphore (if limited)   │
//!            │ select! {                         │
//!            │   job   ← queue  → spawn worker   │
//!            │   grace ← shutdown → Draining ────┼──┐
//!            │ }                                 │  │
//!            └───────────────────────────────────┘  │
//!                                                   ▼
//!   Draining: close queue (no new admission)
//!             → dispatch jobs already buffered    ┐ one deadline:
//!             → InFlight::await_drain(remaining)  ┘ now + grace
//!             → anything still buffered at the deadline: Abandoned
//!             → DispatchReport
//! ```
//!
//! ## Rules
//! - The dispatcher never awaits a single worker; it only tracks counts.
//! - A job accepted by `enqueue` is run unless the grace deadline passes first.
//! - In-flight workers are not cancelled at shutdown; they run until done or
//!   until the grace period ends, after which the dispatcher returns anyway.
//! - A forced exit is logged with the number of jobs still running or abandoned.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::inflight::{Drain, InFlight};
use super::worker::{WorkerContext, execute};
use crate::error::DeliveryError;
use crate::jobs::Envelope;
use crate::subscribers::{ErrorSink, FailureRecord};

/// Summary of a dispatcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Jobs handed to workers.
    pub dispatched: u64,
    /// Buffered jobs never dispatched because the grace deadline passed
    /// (reported as `Abandoned`).
    pub abandoned: u64,
    /// Whether every accepted job was dispatched and finished within the grace period.
    pub drained: bool,
    /// Workers still running when the dispatcher returned.
    pub in_flight: usize,
}

#[derive(Clone, Copy)]
enum State {
    Running,
    Draining(Duration),
}

pub(crate) struct Dispatcher {
    rx: mpsc::Receiver<Envelope>,
    ctx: Arc<WorkerContext>,
    inflight: InFlight,
    limiter: Option<Arc<Semaphore>>,
    sink: ErrorSink,
    shutdown: oneshot::Receiver<Duration>,
}

impl Dispatcher {
    pub(crate) fn new(
        rx: mpsc::Receiver<Envelope>,
        ctx: Arc<WorkerContext>,
        inflight: InFlight,
        max_concurrent: Option<usize>,
        shutdown: oneshot::Receiver<Duration>,
    ) -> Self {
        let sink = ctx.sink.clone();
        Self {
            rx,
            ctx,
            inflight,
            limiter: max_concurrent.map(|n| Arc::new(Semaphore::new(n))),
            sink,
            shutdown,
        }
    }

    /// Runs until a shutdown request arrives, then drains.
    ///
    /// A dropped shutdown sender counts as a request with zero grace.
    pub(crate) async fn run(mut self) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut state = State::Running;

        loop {
            match state {
                State::Running => match self.next().await {
                    Next::Job(envelope, permit) => {
                        self.spawn(envelope, permit);
                        report.dispatched += 1;
                    }
                    Next::Shutdown(grace) => state = State::Draining(grace),
                },
                State::Draining(grace) => {
                    self.drain(grace, &mut report).await;
                    return report;
                }
            }
        }
    }

    async fn next(&mut self) -> Next {
        let permit = match &self.limiter {
            Some(sem) => {
                let sem = Arc::clone(sem);
                tokio::select! {
                    biased;
                    grace = &mut self.shutdown => {
                        return Next::Shutdown(grace.unwrap_or(Duration::ZERO));
                    }
                    permit = sem.acquire_owned() => match permit {
                        Ok(p) => Some(p),
                        Err(_closed) => return Next::Shutdown(Duration::ZERO),
                    },
                }
            }
            None => None,
        };

        tokio::select! {
            biased;
            grace = &mut self.shutdown => Next::Shutdown(grace.unwrap_or(Duration::ZERO)),
            job = self.rx.recv() => match job {
                Some(envelope) => Next::Job(envelope, permit),
                None => Next::Shutdown(Duration::ZERO),
            },
        }
    }

    fn spawn(&self, envelope: Envelope, permit: Option<OwnedSemaphorePermit>) {
        let guard = self.inflight.begin();
        let ctx = Arc::clone(&self.ctx);
        debug!(
            job = %envelope.id,
            kind = envelope.job.kind().as_label(),
            "dispatching job"
        );
        tokio::spawn(async move {
            let _guard = guard;
            let _permit = permit;
            execute(&ctx, envelope).await;
        });
    }

    async fn drain(&mut self, grace: Duration, report: &mut DispatchReport) {
        self.rx.close();
        let deadline = Instant::now() + grace;
        info!(
            in_flight = self.inflight.count(),
            buffered = self.rx.len(),
            grace_ms = grace.as_millis() as u64,
            "dispatcher draining"
        );

        let _ = tokio::time::timeout_at(deadline, self.flush(report)).await;
        while let Ok(envelope) = self.rx.try_recv() {
            self.sink
                .report(FailureRecord::new(&envelope, DeliveryError::Abandoned));
            report.abandoned += 1;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.inflight.await_drain(remaining).await {
            Drain::Drained if report.abandoned == 0 => {
                report.drained = true;
                report.in_flight = 0;
                info!(dispatched = report.dispatched, "dispatcher drained");
            }
            outcome => {
                let in_flight = match outcome {
                    Drain::TimedOut { remaining } => remaining,
                    Drain::Drained => 0,
                };
                report.drained = false;
                report.in_flight = in_flight;
                warn!(
                    in_flight,
                    abandoned = report.abandoned,
                    grace_ms = grace.as_millis() as u64,
                    "shutdown grace exceeded; forcing exit with unfinished jobs"
                );
            }
        }
    }

    /// Dispatches every job still buffered in the closed queue.
    async fn flush(&mut self, report: &mut DispatchReport) {
        loop {
            let permit = match &self.limiter {
                Some(sem) => match Arc::clone(sem).acquire_owned().await {
                    Ok(p) => Some(p),
                    Err(_closed) => return,
                },
                None => None,
            };
            match self.rx.recv().await {
                Some(envelope) => {
                    self.spawn(envelope, permit);
                    report.dispatched += 1;
                }
                None => return,
            }
        }
    }
}

enum Next {
    Job(Envelope, Option<OwnedSemaphorePermit>),
    Shutdown(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::NotificationJob;
    use crate::mail::{LogMailer, MailError, Mailbox, Mailer, Message};
    use crate::render::ManualRenderer;
    use crate::subscribers::{Received, SinkPolicy, SinkReceiver};
    use async_trait::async_trait;

    fn ctx(mailer: Arc<dyn Mailer>) -> (Arc<WorkerContext>, SinkReceiver) {
        let (sink, sink_rx) = ErrorSink::channel(SinkPolicy::Unbounded);
        let ctx = Arc::new(WorkerContext {
            mailer,
            renderer: Arc::new(ManualRenderer),
            sender: Mailbox::new("Membership", "noreply@example.com"),
            sink,
            job_timeout: None,
        });
        (ctx, sink_rx)
    }

    async fn buffered(n: usize) -> (mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(8);
        for i in 0..n {
            tx.send(Envelope::new(NotificationJob::raw(format!("u{i}@example.com"), "s", "b")))
                .await
                .unwrap();
        }
        (tx, rx)
    }

    struct Hangs;

    #[async_trait]
    impl Mailer for Hangs {
        async fn send(&self, _message: &Message) -> Result<(), MailError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn buffered_jobs_are_dispatched_while_draining() {
        let (ctx, mut sink_rx) = ctx(Arc::new(LogMailer));
        let (tx, rx) = buffered(3).await;
        let (stop_tx, stop_rx) = oneshot::channel();
        stop_tx.send(Duration::from_secs(1)).unwrap();

        let report = Dispatcher::new(rx, ctx, InFlight::new(), Some(2), stop_rx)
            .run()
            .await;

        assert_eq!(report.dispatched, 3);
        assert_eq!(report.abandoned, 0);
        assert!(report.drained);
        assert!(tx.is_closed());
        assert!(matches!(sink_rx.try_recv(), Received::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_left_at_the_deadline_are_abandoned() {
        let (ctx, mut sink_rx) = ctx(Arc::new(Hangs));
        let (_tx, rx) = buffered(3).await;
        let (stop_tx, stop_rx) = oneshot::channel();
        stop_tx.send(Duration::from_millis(50)).unwrap();

        let report = Dispatcher::new(rx, ctx, InFlight::new(), Some(1), stop_rx)
            .run()
            .await;

        assert_eq!(report.dispatched, 1);
        assert_eq!(report.abandoned, 2);
        assert_eq!(report.in_flight, 1);
        assert!(!report.drained);
        for _ in 0..2 {
            let Received::Record(r) = sink_rx.try_recv() else {
                panic!("expected an abandoned record");
            };
            assert_eq!(r.error, DeliveryError::Abandoned);
        }
    }
}
