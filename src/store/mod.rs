//! # Subscription store: atomic plan replacement.
//!
//! [`SubscriptionStore`] owns the invariant **a user has at most one active
//! subscription**. Its single write operation, [`replace`](SubscriptionStore::replace),
//! runs as one transaction:
//!
//! ```text
//! begin ──► plan(plan_id)?  ── missing ──► rollback, NotFound
//!        ──► active_subscription(user) ── some ──► delete_subscription(user)
//!        ──► insert_subscription(user, plan_id, now)
//!        ──► commit
//!            any error ──► rollback (old subscription intact)
//!            Conflict  ──► retry per RetryPolicy, then surface
//! ```
//!
//! Persistence is pluggable through [`Backend`] / [`Tx`]:
//! - [`MemoryBackend`]: in-process tables; a transaction holds the table lock.
//! - [`SqliteBackend`] (feature `sqlite`): sqlx over SQLite, `UNIQUE(user_id)`.
//!
//! Dropping an uncommitted [`Tx`] rolls it back.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::model::{Plan, PlanId, UserId};
use crate::policies::RetryPolicy;

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

/// The single current plan of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSubscription {
    pub user_id: UserId,
    pub plan_id: PlanId,
    /// When this row was inserted; a replace resets it.
    pub created_at: DateTime<Utc>,
    /// Last write to this row.
    pub updated_at: DateTime<Utc>,
}

/// Source of transactions.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Opens a transaction.
    async fn begin(&self) -> Result<Box<dyn Tx>, StoreError>;
}

/// One open transaction.
///
/// Writes become visible to other transactions only after [`commit`](Tx::commit).
#[async_trait]
pub trait Tx: Send {
    /// Looks up one plan; `None` if it does not exist.
    async fn plan(&mut self, id: PlanId) -> Result<Option<Plan>, StoreError>;

    /// Every plan, ordered by id.
    async fn plans(&mut self) -> Result<Vec<Plan>, StoreError>;

    /// The user's subscription as seen by this transaction.
    async fn active_subscription(
        &mut self,
        user: UserId,
    ) -> Result<Option<ActiveSubscription>, StoreError>;

    /// Removes the user's subscription. Removing nothing is not an error.
    async fn delete_subscription(&mut self, user: UserId) -> Result<(), StoreError>;

    /// Inserts a subscription. Fails with `Conflict` if the user already has one.
    async fn insert_subscription(
        &mut self,
        user: UserId,
        plan: PlanId,
        now: DateTime<Utc>,
    ) -> Result<ActiveSubscription, StoreError>;

    /// Publishes every write of this transaction at once.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discards every write of this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Handler-facing subscription operations.
#[derive(Clone)]
pub struct SubscriptionStore {
    backend: Arc<dyn Backend>,
    retry: RetryPolicy,
}

impl SubscriptionStore {
    /// Store over `backend` with [`RetryPolicy::default`].
    pub fn new(backend: impl Backend) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    /// Store over an already shared backend.
    pub fn from_arc(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the conflict retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Atomically makes `plan` the user's only active subscription.
    ///
    /// On `Err` the previous subscription (if any) is untouched.
    pub async fn replace(
        &self,
        user: UserId,
        plan: PlanId,
    ) -> Result<ActiveSubscription, StoreError> {
        self.replace_returning_plan(user, plan)
            .await
            .map(|(sub, _)| sub)
    }

    /// Like [`replace`](Self::replace), also returning the plan as read inside
    /// the transaction.
    pub async fn replace_returning_plan(
        &self,
        user: UserId,
        plan: PlanId,
    ) -> Result<(ActiveSubscription, Plan), StoreError> {
        let mut attempt = 1;
        loop {
            match self.replace_once(user, plan).await {
                Ok(out) => {
                    info!(user_id = %user, plan_id = %plan, attempt, "subscription replaced");
                    return Ok(out);
                }
                Err(e) if e.is_retryable() => match self.retry.delay_after(attempt) {
                    Some(delay) => {
                        warn!(
                            user_id = %user,
                            plan_id = %plan,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "replace conflicted; retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn replace_once(
        &self,
        user: UserId,
        plan: PlanId,
    ) -> Result<(ActiveSubscription, Plan), StoreError> {
        let mut tx = self.backend.begin().await?;
        match replace_in(tx.as_mut(), user, plan).await {
            Ok(out) => {
                tx.commit().await?;
                Ok(out)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(user_id = %user, error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// The user's current subscription, if any.
    pub async fn active(&self, user: UserId) -> Result<Option<ActiveSubscription>, StoreError> {
        let mut tx = self.backend.begin().await?;
        let out = tx.active_subscription(user).await;
        finish_read(tx).await;
        out
    }

    /// Looks up one plan outside any replace.
    pub async fn plan(&self, id: PlanId) -> Result<Option<Plan>, StoreError> {
        let mut tx = self.backend.begin().await?;
        let out = tx.plan(id).await;
        finish_read(tx).await;
        out
    }

    /// Every plan, ordered by id.
    pub async fn plans(&self) -> Result<Vec<Plan>, StoreError> {
        let mut tx = self.backend.begin().await?;
        let out = tx.plans().await;
        finish_read(tx).await;
        out
    }
}

async fn replace_in(
    tx: &mut dyn Tx,
    user: UserId,
    plan_id: PlanId,
) -> Result<(ActiveSubscription, Plan), StoreError> {
    let plan = tx.plan(plan_id).await?.ok_or(StoreError::NotFound {
        entity: "plan",
        id: plan_id.0,
    })?;
    if let Some(old) = tx.active_subscription(user).await? {
        debug!(user_id = %user, old_plan_id = %old.plan_id, "removing previous subscription");
        tx.delete_subscription(user).await?;
    }
    let sub = tx.insert_subscription(user, plan_id, Utc::now()).await?;
    Ok((sub, plan))
}

async fn finish_read(tx: Box<dyn Tx>) {
    if let Err(e) = tx.rollback().await {
        debug!(error = %e, "read transaction rollback failed");
    }
}
