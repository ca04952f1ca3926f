//! # Mail sender collaborator.
//!
//! The pipeline only needs `send(message)`; transports (SMTP, HTTP APIs) plug in
//! behind the [`Mailer`] trait. [`LogMailer`] is a development transport that logs
//! each message instead of delivering it.
//!
//! ## Contract
//! - `send` is called **once** per job; the worker never retries.
//! - Attachments reference files on disk; the mailer must finish reading them
//!   before `send` returns (the worker deletes generated files afterwards).

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Sender or recipient display identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub name: String,
    pub email: String,
}

impl Mailbox {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// File attached under a display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub path: PathBuf,
}

/// Outbound email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: Mailbox,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Errors returned by a [`Mailer`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// A from/to address was rejected.
    #[error("invalid address {0:?}")]
    Address(String),

    /// Transport failed (connection, auth, remote rejection).
    #[error("transport: {0}")]
    Transport(String),
}

/// Mail-sending collaborator.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Deliver one message.
    async fn send(&self, message: &Message) -> Result<(), MailError>;
}

/// Logs messages at `info` instead of sending them.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &Message) -> Result<(), MailError> {
        if message.to.is_empty() {
            return Err(MailError::Address(String::new()));
        }
        if let Some(bad) = message.to.iter().find(|to| !to.contains('@')) {
            return Err(MailError::Address(bad.clone()));
        }
        info!(
            from = %message.from.email,
            to = ?message.to,
            subject = %message.subject,
            attachments = message.attachments.len(),
            "mail (log transport)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &[&str]) -> Message {
        Message {
            from: Mailbox::new("Membership", "noreply@example.com"),
            to: to.iter().map(|s| s.to_string()).collect(),
            subject: "hi".into(),
            body: "body".into(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn log_mailer_accepts_valid_recipients() {
        assert!(LogMailer.send(&message(&["a@example.com"])).await.is_ok());
    }

    #[tokio::test]
    async fn log_mailer_rejects_malformed_recipient() {
        let err = LogMailer
            .send(&message(&["a@example.com", "nobody"]))
            .await
            .unwrap_err();
        assert_eq!(err, MailError::Address("nobody".into()));
    }
}
