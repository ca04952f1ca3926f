//! # Execute one notification job.
//!
//! Runs a single [`Envelope`] to completion and reports its outcome.
//!
//! ## Flow
//! ```text
//! SendInvoiceEmail:      invoice_body(plan) → mailer.send()
//! SendRawEmail:          mailer.send()
//! GenerateAndSendManual: renderer.render(output_path) ──ok──► mailer.send(attachment)
//!                                                    └─err──► report Render, no send
//! every kind:            remove artifact (if any)
//! ```
//!
//! ## Rules
//! - The mailer is called **at most once** per job; nothing is retried.
//! - A failed job produces **exactly one** [`FailureRecord`] at the sink.
//! - Panics are contained (`catch_unwind`) and reported as `Panicked`.
//! - The optional per-job timeout covers render and send together.
//! - The generated file is removed once the job ends, whatever the outcome.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::{DeliveryError, panic_info};
use crate::jobs::{Envelope, INVOICE_SUBJECT, MANUAL_ATTACHMENT_NAME, NotificationJob, invoice_body};
use crate::mail::{Attachment, Mailbox, Mailer, Message};
use crate::render::{DocumentRenderer, MANUAL_TEMPLATE, ManualData};
use crate::subscribers::{ErrorSink, FailureRecord};

/// Subject line of manual emails.
pub const MANUAL_SUBJECT: &str = "Your manual";
/// Body of manual emails.
pub const MANUAL_BODY: &str = "Your user manual is attached";

/// Collaborators and settings shared by every worker.
pub(crate) struct WorkerContext {
    pub mailer: Arc<dyn Mailer>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub sender: Mailbox,
    pub sink: ErrorSink,
    pub job_timeout: Option<Duration>,
}

/// Runs `envelope` and reports a failure, if any, to the sink.
///
/// Returns `true` when the job succeeded.
pub(crate) async fn execute(ctx: &WorkerContext, envelope: Envelope) -> bool {
    let kind = envelope.job.kind();
    let fut = std::panic::AssertUnwindSafe(run(ctx, &envelope.job)).catch_unwind();

    let res = match ctx.job_timeout {
        Some(dur) => match tokio::time::timeout(dur, fut).await {
            Ok(r) => r,
            Err(_elapsed) => Ok(Err(DeliveryError::Timeout { timeout: dur })),
        },
        None => fut.await,
    };
    let res = match res {
        Ok(r) => r,
        Err(payload) => Err(DeliveryError::Panicked {
            info: panic_info(&*payload),
        }),
    };

    if let Some(path) = envelope.job.artifact() {
        remove_artifact(path).await;
    }

    match res {
        Ok(()) => {
            debug!(
                job = %envelope.id,
                kind = kind.as_label(),
                waited_ms = envelope.enqueued_at.elapsed().as_millis() as u64,
                "job delivered"
            );
            true
        }
        Err(err) => {
            ctx.sink.report(FailureRecord::new(&envelope, err));
            false
        }
    }
}

async fn run(ctx: &WorkerContext, job: &NotificationJob) -> Result<(), DeliveryError> {
    match job {
        NotificationJob::SendInvoiceEmail { recipient, plan } => {
            let body = invoice_body(plan)?;
            send(ctx, message(ctx, recipient, INVOICE_SUBJECT, body)).await
        }
        NotificationJob::SendRawEmail {
            recipient,
            subject,
            body,
        } => send(ctx, message(ctx, recipient, subject, body.clone())).await,
        NotificationJob::GenerateAndSendManual {
            recipient,
            user,
            plan,
            output_path,
        } => {
            let data = ManualData::new(user.full_name(), &plan.name);
            ctx.renderer
                .render(MANUAL_TEMPLATE, &data, output_path)
                .await
                .map_err(|e| DeliveryError::Render {
                    error: e.to_string(),
                })?;

            let mut msg = message(ctx, recipient, MANUAL_SUBJECT, MANUAL_BODY.to_string());
            msg.attachments.push(Attachment {
                name: MANUAL_ATTACHMENT_NAME.to_string(),
                path: output_path.clone(),
            });
            send(ctx, msg).await
        }
    }
}

fn message(ctx: &WorkerContext, recipient: &str, subject: &str, body: String) -> Message {
    Message {
        from: ctx.sender.clone(),
        to: vec![recipient.to_string()],
        subject: subject.to_string(),
        body,
        attachments: Vec::new(),
    }
}

async fn send(ctx: &WorkerContext, msg: Message) -> Result<(), DeliveryError> {
    ctx.mailer
        .send(&msg)
        .await
        .map_err(|e| DeliveryError::Send {
            error: e.to_string(),
        })
}

async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "generated file removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove generated file"),
    }
}
