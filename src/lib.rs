//! # membervisor
//!
//! **Membervisor** is the post-purchase fulfilment core of a membership site.
//!
//! When a user subscribes to a plan it:
//! 1. atomically replaces any existing subscription with the new one
//!    ([`SubscriptionStore::replace`]);
//! 2. queues an invoice email and a personalised manual (rendered, attached, emailed)
//!    without blocking the request;
//! 3. shuts down cleanly: no in-flight notification is lost silently and every
//!    failure ends up at one error sink.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   request handler
//!        │ checkout::subscribe_to_plan
//!        ├─► SubscriptionStore::replace (tx: delete old → insert new → commit)
//!        │
//!        └─► NotificationQueue::enqueue ──(full for timeout)──► EnqueueError + sink record
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Dispatcher (Running → Draining)                             │
//! │  - bounded mpsc queue                                        │
//! │  - Semaphore (max_concurrent, optional)                      │
//! │  - InFlight counter (guard per worker)                       │
//! └──────┬──────────────────┬──────────────────┬─────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌────────────┐     ┌────────────┐     ┌────────────┐
//!     │  worker    │     │  worker    │     │  worker    │
//!     │ (invoice)  │     │ (manual)   │     │ (raw)      │
//!     └─────┬──────┘     └─────┬──────┘     └─────┬──────┘
//!           │ failures         │                  │
//!           ▼                  ▼                  ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ErrorSink (Unbounded | DropOldest(n))                       │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                ▼
//!                         logger loop (one)
//!                        ┌───────┴────────┐
//!                        ▼                ▼
//!                    LogWriter        FailureLog / custom Subscribe
//! ```
//!
//! ### Shutdown
//! ```text
//! signal / Pipeline::shutdown(timeout)
//!   ├─► queue closed: enqueue → EnqueueError::Closed
//!   ├─► buffered jobs still dispatched          ┐ all within
//!   ├─► await in-flight == 0                    ┘ one timeout
//!   │       ├─ drained   → ShutdownReport { drained: true }
//!   │       └─ timed out → warn!, ShutdownReport { drained: false, in_flight }
//!   │                      (jobs never dispatched → DeliveryError::Abandoned)
//!   └─► logger flushes buffered records and stops
//! ```
//!
//! ## Features
//! | Area              | Description                                            | Key types / traits                          |
//! |-------------------|--------------------------------------------------------|---------------------------------------------|
//! | **Store**         | Atomic plan replacement with conflict retry.           | [`SubscriptionStore`], [`Backend`], [`Tx`]  |
//! | **Queue**         | Bounded admission with enqueue timeout.                | [`NotificationQueue`], [`NotificationJob`]  |
//! | **Runtime**       | Dispatcher, workers, graceful shutdown.                | [`Pipeline`], [`PipelineBuilder`]           |
//! | **Failures**      | Error sink, logger loop, subscribers.                  | [`ErrorSink`], [`Subscribe`], [`FailureLog`]|
//! | **Collaborators** | Mail transport and document generator seams.           | [`Mailer`], [`DocumentRenderer`]            |
//! | **Errors**        | Typed errors with stable labels.                       | [`StoreError`], [`DeliveryError`]           |
//! | **Configuration** | Defaults plus environment overrides.                   | [`Config`]                                  |
//!
//! ## Optional features
//! - `sqlite` (default): [`SqliteBackend`] over sqlx.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use membervisor::{
//!     checkout, Config, MemoryBackend, Pipeline, Plan, PlanId, SubscriptionStore, UserId,
//!     UserSnapshot,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config {
//!         manual_dir: std::env::temp_dir().join("membervisor-doc"),
//!         ..Config::default()
//!     };
//!     let pipeline = Pipeline::start(cfg);
//!
//!     let store = SubscriptionStore::new(MemoryBackend::with_plans([Plan {
//!         id: PlanId(1),
//!         name: "Bronze".into(),
//!         amount_cents: 1000,
//!     }]));
//!     let user = UserSnapshot {
//!         id: UserId(42),
//!         email: "ada@example.com".into(),
//!         first_name: "Ada".into(),
//!         last_name: "Lovelace".into(),
//!     };
//!
//!     let done = checkout::subscribe_to_plan(&store, &pipeline.queue(), &user, PlanId(1)).await?;
//!     assert_eq!(done.subscription.plan_id, PlanId(1));
//!
//!     assert!(pipeline.shutdown(Duration::from_secs(5)).await);
//!     Ok(())
//! }
//! ```

pub mod checkout;
mod core;
mod error;
mod jobs;
pub mod mail;
mod model;
mod policies;
pub mod render;
mod store;
mod subscribers;

// ---- Public re-exports ----

pub use core::{
    Config, DispatchReport, Drain, InFlight, InFlightGuard, MANUAL_BODY, MANUAL_SUBJECT,
    NotificationQueue, Pipeline, PipelineBuilder, ShutdownReport, wait_for_shutdown_signal,
};
pub use error::{ConfigError, DeliveryError, EnqueueError, RuntimeError, StoreError};
pub use jobs::{
    Envelope, INVOICE_SUBJECT, JobId, JobKind, MANUAL_ATTACHMENT_NAME, NotificationJob,
    invoice_amount, invoice_body, manual_path,
};
pub use mail::{Attachment, LogMailer, MailError, Mailbox, Mailer, Message};
pub use model::{Plan, PlanId, UserId, UserSnapshot};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use render::{DocumentRenderer, MANUAL_TEMPLATE, ManualData, ManualRenderer, RenderError};
pub use store::{ActiveSubscription, Backend, MemoryBackend, SubscriptionStore, Tx};
pub use subscribers::{
    ErrorSink, FailureLog, FailureRecord, LogWriter, Received, SinkPolicy, SinkReceiver,
    SinkStats, Subscribe,
};

#[cfg(feature = "sqlite")]
pub use store::SqliteBackend;
