use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use membervisor::{
    ActiveSubscription, Backend, BackoffPolicy, JitterPolicy, MemoryBackend, Plan, PlanId,
    RetryPolicy, StoreError, SubscriptionStore, Tx, UserId,
};

fn plan(id: i64, name: &str) -> Plan {
    Plan {
        id: PlanId(id),
        name: name.into(),
        amount_cents: 1000 * id,
    }
}

fn plans() -> Vec<Plan> {
    vec![plan(1, "Bronze"), plan(2, "Silver"), plan(7, "Gold")]
}

fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        backoff: BackoffPolicy {
            first: Duration::from_millis(1),
            max: Duration::from_millis(5),
            factor: 2.0,
            jitter: JitterPolicy::Full,
        },
    }
}

/// Fails `insert_subscription` with `error` while `remaining` is above zero.
struct Flaky {
    inner: MemoryBackend,
    remaining: Arc<AtomicU32>,
    begins: Arc<AtomicU32>,
    error: StoreError,
}

struct FlakyTx {
    inner: Box<dyn Tx>,
    remaining: Arc<AtomicU32>,
    error: StoreError,
}

#[async_trait]
impl Backend for Flaky {
    async fn begin(&self) -> Result<Box<dyn Tx>, StoreError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FlakyTx {
            inner: self.inner.begin().await?,
            remaining: Arc::clone(&self.remaining),
            error: self.error.clone(),
        }))
    }
}

#[async_trait]
impl Tx for FlakyTx {
    async fn plan(&mut self, id: PlanId) -> Result<Option<Plan>, StoreError> {
        self.inner.plan(id).await
    }

    async fn plans(&mut self) -> Result<Vec<Plan>, StoreError> {
        self.inner.plans().await
    }

    async fn active_subscription(
        &mut self,
        user: UserId,
    ) -> Result<Option<ActiveSubscription>, StoreError> {
        self.inner.active_subscription(user).await
    }

    async fn delete_subscription(&mut self, user: UserId) -> Result<(), StoreError> {
        self.inner.delete_subscription(user).await
    }

    async fn insert_subscription(
        &mut self,
        user: UserId,
        plan: PlanId,
        now: DateTime<Utc>,
    ) -> Result<ActiveSubscription, StoreError> {
        let left = self.remaining.load(Ordering::SeqCst);
        if left > 0 {
            self.remaining.store(left - 1, Ordering::SeqCst);
            return Err(self.error.clone());
        }
        self.inner.insert_subscription(user, plan, now).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

fn flaky(failures: u32, error: StoreError) -> (Flaky, MemoryBackend, Arc<AtomicU32>) {
    let inner = MemoryBackend::with_plans(plans());
    let begins = Arc::new(AtomicU32::new(0));
    (
        Flaky {
            inner: inner.clone(),
            remaining: Arc::new(AtomicU32::new(failures)),
            begins: Arc::clone(&begins),
            error,
        },
        inner,
        begins,
    )
}

#[tokio::test]
async fn replace_twice_leaves_only_the_second_plan() {
    let store = SubscriptionStore::new(MemoryBackend::with_plans(plans()));
    let user = UserId(3);

    store.replace(user, PlanId(1)).await.unwrap();
    let second = store.replace(user, PlanId(2)).await.unwrap();

    assert_eq!(second.plan_id, PlanId(2));
    let active = store.active(user).await.unwrap().unwrap();
    assert_eq!(active.plan_id, PlanId(2));
}

#[tokio::test]
async fn user_42_moves_from_plan_1_to_plan_7() {
    let store = SubscriptionStore::new(MemoryBackend::with_plans(plans()));
    store.replace(UserId(42), PlanId(1)).await.unwrap();

    let sub = store.replace(UserId(42), PlanId(7)).await.unwrap();
    assert_eq!((sub.user_id, sub.plan_id), (UserId(42), PlanId(7)));
    assert_eq!(
        store.active(UserId(42)).await.unwrap().map(|s| s.plan_id),
        Some(PlanId(7))
    );
}

#[tokio::test]
async fn missing_plan_is_not_found_and_keeps_old_subscription() {
    let store = SubscriptionStore::new(MemoryBackend::with_plans(plans()));
    store.replace(UserId(1), PlanId(1)).await.unwrap();

    let err = store.replace(UserId(1), PlanId(99)).await.unwrap_err();
    assert_eq!(err, StoreError::NotFound { entity: "plan", id: 99 });
    assert_eq!(
        store.active(UserId(1)).await.unwrap().map(|s| s.plan_id),
        Some(PlanId(1))
    );
}

#[tokio::test]
async fn shared_backend_answers_plan_lookups() {
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::with_plans(plans()));
    let store = SubscriptionStore::from_arc(Arc::clone(&backend));

    assert_eq!(store.plan(PlanId(7)).await.unwrap(), Some(plan(7, "Gold")));
    assert_eq!(store.plan(PlanId(99)).await.unwrap(), None);

    let empty = SubscriptionStore::new(MemoryBackend::new());
    assert!(empty.plans().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_replaces_never_expose_zero_or_two_subscriptions() {
    let store = SubscriptionStore::new(MemoryBackend::with_plans(plans()));
    let user = UserId(9);
    store.replace(user, PlanId(1)).await.unwrap();

    let observer = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let seen = store.active(user).await.unwrap();
                assert!(seen.is_some(), "observer saw no subscription");
                tokio::task::yield_now().await;
            }
        })
    };

    let mut writers = Vec::new();
    for plan in [PlanId(1), PlanId(2)] {
        let store = store.clone();
        writers.push(tokio::spawn(async move {
            for _ in 0..50 {
                store.replace(user, plan).await.unwrap();
            }
        }));
    }
    for w in writers {
        w.await.unwrap();
    }
    observer.await.unwrap();

    let last = store.active(user).await.unwrap().unwrap();
    assert!(last.plan_id == PlanId(1) || last.plan_id == PlanId(2));
}

#[tokio::test]
async fn conflicts_are_retried_until_success() {
    let (backend, _inner, begins) = flaky(
        2,
        StoreError::Conflict {
            details: "database is locked".into(),
        },
    );
    let store = SubscriptionStore::new(backend).with_retry(fast_retry(3));

    let sub = store.replace(UserId(5), PlanId(2)).await.unwrap();
    assert_eq!(sub.plan_id, PlanId(2));
    assert_eq!(begins.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_conflicts_roll_back_to_the_old_plan() {
    let (backend, inner, begins) = flaky(
        0,
        StoreError::Conflict {
            details: "busy".into(),
        },
    );
    let remaining = Arc::clone(&backend.remaining);
    let store = SubscriptionStore::new(backend).with_retry(fast_retry(2));
    store.replace(UserId(5), PlanId(1)).await.unwrap();

    remaining.store(10, Ordering::SeqCst);
    let err = store.replace(UserId(5), PlanId(7)).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(begins.load(Ordering::SeqCst), 1 + 2);

    let untouched = SubscriptionStore::new(inner);
    assert_eq!(
        untouched.active(UserId(5)).await.unwrap().map(|s| s.plan_id),
        Some(PlanId(1))
    );
}

#[tokio::test]
async fn unavailable_is_surfaced_without_retry() {
    let (backend, _inner, begins) = flaky(
        1,
        StoreError::Unavailable {
            details: "disk I/O error".into(),
        },
    );
    let store = SubscriptionStore::new(backend);

    let err = store.replace(UserId(5), PlanId(1)).await.unwrap_err();
    assert_eq!(err.as_label(), "store_unavailable");
    assert_eq!(begins.load(Ordering::SeqCst), 1);
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use membervisor::SqliteBackend;

    async fn backend(dir: &tempfile::TempDir) -> SqliteBackend {
        let backend = SqliteBackend::from_path(dir.path().join("store.db"))
            .await
            .unwrap();
        for p in plans() {
            backend.insert_plan(&p).await.unwrap();
        }
        backend
    }

    async fn rows_for(backend: &SqliteBackend, user: UserId) -> i64 {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_plans WHERE user_id = ?")
            .bind(user.0)
            .fetch_one(backend.pool())
            .await
            .unwrap();
        n
    }

    #[tokio::test]
    async fn replace_keeps_a_single_row() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir).await;
        let store = SubscriptionStore::new(backend.clone());

        store.replace(UserId(42), PlanId(1)).await.unwrap();
        let sub = store.replace(UserId(42), PlanId(7)).await.unwrap();

        assert_eq!(sub.plan_id, PlanId(7));
        assert_eq!(rows_for(&backend, UserId(42)).await, 1);
        let active = store.active(UserId(42)).await.unwrap().unwrap();
        assert_eq!(active.plan_id, PlanId(7));
        assert_eq!(store.plans().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_plan_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir).await;
        let store = SubscriptionStore::new(backend.clone());
        store.replace(UserId(1), PlanId(2)).await.unwrap();

        let err = store.replace(UserId(1), PlanId(404)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 404, .. }));
        assert_eq!(
            store.active(UserId(1)).await.unwrap().map(|s| s.plan_id),
            Some(PlanId(2))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_replaces_commit_exactly_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir).await;
        let store = SubscriptionStore::new(backend.clone()).with_retry(fast_retry(50));

        let mut writers = Vec::new();
        for plan in [PlanId(1), PlanId(2)] {
            let store = store.clone();
            writers.push(tokio::spawn(async move {
                for _ in 0..10 {
                    store.replace(UserId(8), plan).await.unwrap();
                }
            }));
        }
        for w in writers {
            w.await.unwrap();
        }

        assert_eq!(rows_for(&backend, UserId(8)).await, 1);
    }
}
