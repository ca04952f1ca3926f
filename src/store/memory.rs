//! In-memory backend.
//!
//! A transaction holds the table lock from `begin` until commit/rollback/drop, so
//! transactions are fully serialised. Writes are staged and applied on commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ActiveSubscription, Backend, Tx};
use crate::error::StoreError;
use crate::model::{Plan, PlanId, UserId};

#[derive(Debug, Default)]
struct Tables {
    plans: BTreeMap<PlanId, Plan>,
    subscriptions: HashMap<UserId, ActiveSubscription>,
}

/// Process-local backend. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryBackend {
    /// Empty backend with no plans.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated with `plans`.
    pub fn with_plans(plans: impl IntoIterator<Item = Plan>) -> Self {
        let tables = Tables {
            plans: plans.into_iter().map(|p| (p.id, p)).collect(),
            subscriptions: HashMap::new(),
        };
        Self {
            tables: Arc::new(Mutex::new(tables)),
        }
    }

    /// Inserts or overwrites a plan.
    pub async fn insert_plan(&self, plan: Plan) {
        self.tables.lock().await.plans.insert(plan.id, plan);
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn begin(&self) -> Result<Box<dyn Tx>, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        Ok(Box::new(MemoryTx {
            tables: guard,
            staged: HashMap::new(),
        }))
    }
}

struct MemoryTx {
    tables: OwnedMutexGuard<Tables>,
    /// `Some` = upsert, `None` = delete.
    staged: HashMap<UserId, Option<ActiveSubscription>>,
}

impl MemoryTx {
    fn current(&self, user: UserId) -> Option<&ActiveSubscription> {
        match self.staged.get(&user) {
            Some(staged) => staged.as_ref(),
            None => self.tables.subscriptions.get(&user),
        }
    }
}

#[async_trait]
impl Tx for MemoryTx {
    async fn plan(&mut self, id: PlanId) -> Result<Option<Plan>, StoreError> {
        Ok(self.tables.plans.get(&id).cloned())
    }

    async fn plans(&mut self) -> Result<Vec<Plan>, StoreError> {
        Ok(self.tables.plans.values().cloned().collect())
    }

    async fn active_subscription(
        &mut self,
        user: UserId,
    ) -> Result<Option<ActiveSubscription>, StoreError> {
        Ok(self.current(user).cloned())
    }

    async fn delete_subscription(&mut self, user: UserId) -> Result<(), StoreError> {
        self.staged.insert(user, None);
        Ok(())
    }

    async fn insert_subscription(
        &mut self,
        user: UserId,
        plan: PlanId,
        now: DateTime<Utc>,
    ) -> Result<ActiveSubscription, StoreError> {
        if self.current(user).is_some() {
            return Err(StoreError::conflict(format!(
                "user {user} already has an active subscription"
            )));
        }
        if !self.tables.plans.contains_key(&plan) {
            return Err(StoreError::NotFound {
                entity: "plan",
                id: plan.0,
            });
        }
        let sub = ActiveSubscription {
            user_id: user,
            plan_id: plan,
            created_at: now,
            updated_at: now,
        };
        self.staged.insert(user, Some(sub.clone()));
        Ok(sub)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            mut tables,
            staged,
        } = *self;
        for (user, change) in staged {
            match change {
                Some(sub) => tables.subscriptions.insert(user, sub),
                None => tables.subscriptions.remove(&user),
            };
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(id: i64) -> Plan {
        Plan {
            id: PlanId(id),
            name: format!("plan-{id}"),
            amount_cents: 1000 * id,
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded_on_drop() {
        let backend = MemoryBackend::with_plans([plan(1)]);
        {
            let mut tx = backend.begin().await.unwrap();
            tx.insert_subscription(UserId(1), PlanId(1), Utc::now())
                .await
                .unwrap();
        }
        let mut tx = backend.begin().await.unwrap();
        assert!(tx.active_subscription(UserId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_insert_without_delete_conflicts() {
        let backend = MemoryBackend::with_plans([plan(1), plan(2)]);
        let mut tx = backend.begin().await.unwrap();
        tx.insert_subscription(UserId(1), PlanId(1), Utc::now())
            .await
            .unwrap();
        let err = tx
            .insert_subscription(UserId(1), PlanId(2), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn staged_delete_is_visible_inside_the_transaction() {
        let backend = MemoryBackend::with_plans([plan(1)]);
        let mut tx = backend.begin().await.unwrap();
        tx.insert_subscription(UserId(1), PlanId(1), Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = backend.begin().await.unwrap();
        tx.delete_subscription(UserId(1)).await.unwrap();
        assert!(tx.active_subscription(UserId(1)).await.unwrap().is_none());
        tx.rollback().await.unwrap();

        let mut tx = backend.begin().await.unwrap();
        assert!(tx.active_subscription(UserId(1)).await.unwrap().is_some());
    }
}
