//! # Notification jobs.
//!
//! A [`NotificationJob`] is an immutable description of one asynchronous side effect.
//! It carries every value the worker needs, so a job can run after the request that
//! created it has finished and without touching shared mutable state.
//!
//! Jobs are wrapped into an [`Envelope`] at enqueue time, which stamps a process-unique
//! [`JobId`]. The id is what failure records refer to.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Instant;

use crate::model::{Plan, UserSnapshot};

/// Global sequence counter for job ids.
static JOB_SEQ: AtomicU64 = AtomicU64::new(1);

/// Sequence for manual file names; two manuals never share a path.
static MANUAL_SEQ: AtomicU64 = AtomicU64::new(1);

/// File name the manual is attached under.
pub const MANUAL_ATTACHMENT_NAME: &str = "Manual.pdf";

/// Process-unique, monotonically increasing job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl JobId {
    pub(crate) fn next() -> Self {
        JobId(JOB_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Job classification (for logs and failure records).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    SendInvoiceEmail,
    GenerateAndSendManual,
    SendRawEmail,
}

impl JobKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobKind::SendInvoiceEmail => "send_invoice_email",
            JobKind::GenerateAndSendManual => "generate_and_send_manual",
            JobKind::SendRawEmail => "send_raw_email",
        }
    }
}

/// One outbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationJob {
    /// Email an invoice for the plan the user just subscribed to.
    SendInvoiceEmail { recipient: String, plan: Plan },

    /// Render a personalised manual to `output_path`, then email it as an attachment.
    GenerateAndSendManual {
        recipient: String,
        user: UserSnapshot,
        plan: Plan,
        output_path: PathBuf,
    },

    /// Email a fixed subject/body.
    SendRawEmail {
        recipient: String,
        subject: String,
        body: String,
    },
}

impl NotificationJob {
    /// Invoice email to the user's address.
    pub fn invoice(user: &UserSnapshot, plan: &Plan) -> Self {
        NotificationJob::SendInvoiceEmail {
            recipient: user.email.clone(),
            plan: plan.clone(),
        }
    }

    /// Manual rendered into `dir` under a file name no other manual job uses.
    pub fn manual(user: &UserSnapshot, plan: &Plan, dir: impl AsRef<Path>) -> Self {
        let seq = MANUAL_SEQ.fetch_add(1, AtomicOrdering::Relaxed);
        NotificationJob::GenerateAndSendManual {
            recipient: user.email.clone(),
            user: user.clone(),
            plan: plan.clone(),
            output_path: manual_path(dir, user, seq),
        }
    }

    /// Plain message.
    pub fn raw(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        NotificationJob::SendRawEmail {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Classification used in logs and failure records.
    pub fn kind(&self) -> JobKind {
        match self {
            NotificationJob::SendInvoiceEmail { .. } => JobKind::SendInvoiceEmail,
            NotificationJob::GenerateAndSendManual { .. } => JobKind::GenerateAndSendManual,
            NotificationJob::SendRawEmail { .. } => JobKind::SendRawEmail,
        }
    }

    /// Address the notification goes to.
    pub fn recipient(&self) -> &str {
        match self {
            NotificationJob::SendInvoiceEmail { recipient, .. }
            | NotificationJob::GenerateAndSendManual { recipient, .. }
            | NotificationJob::SendRawEmail { recipient, .. } => recipient,
        }
    }

    /// File this job creates on disk, if any. The worker removes it once the job ends.
    pub fn artifact(&self) -> Option<&Path> {
        match self {
            NotificationJob::GenerateAndSendManual { output_path, .. } => Some(output_path),
            _ => None,
        }
    }
}

/// Where manual number `seq` for `user` is rendered: `{dir}/{user_id}_{seq}_user_manual.pdf`.
pub fn manual_path(dir: impl AsRef<Path>, user: &UserSnapshot, seq: u64) -> PathBuf {
    dir.as_ref().join(format!("{}_{}_user_manual.pdf", user.id, seq))
}

/// A job admitted to (or offered to) the queue.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: JobId,
    pub job: NotificationJob,
    pub enqueued_at: Instant,
}

impl Envelope {
    pub(crate) fn new(job: NotificationJob) -> Self {
        Self {
            id: JobId::next(),
            job,
            enqueued_at: Instant::now(),
        }
    }
}
