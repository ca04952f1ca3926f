//! Notification jobs: data model and payload rendering.
//!
//! ## Contents
//! - [`NotificationJob`], [`JobKind`], [`JobId`], [`Envelope`] job description and identity
//! - [`invoice`] invoice amount/body formatting used by `SendInvoiceEmail`
//!
//! Execution lives in `core::worker`.

mod invoice;
mod job;

pub use invoice::{INVOICE_SUBJECT, invoice_amount, invoice_body};
pub use job::{Envelope, JobId, JobKind, MANUAL_ATTACHMENT_NAME, NotificationJob, manual_path};
