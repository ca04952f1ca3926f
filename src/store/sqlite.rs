//! SQLite backend (sqlx).
//!
//! `user_plans.user_id` is `UNIQUE`, so the database itself rejects a second
//! active subscription. Concurrent writers surface as `SQLITE_BUSY` /
//! `SQLITE_LOCKED` or a unique violation; all three map to
//! [`StoreError::Conflict`] and are retried by the store.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool, Transaction};

use super::{ActiveSubscription, Backend, Tx};
use crate::error::StoreError;
use crate::model::{Plan, PlanId, UserId};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// SQLite-backed subscription storage.
#[derive(Clone, Debug)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Wraps an existing pool. Call [`migrate`](Self::migrate) before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to `url` and runs migrations.
    ///
    /// In-memory databases get a single connection, since each connection
    /// would otherwise see its own database.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StoreError::unavailable(format!("connect to {url}: {e}")))?;
        let backend = Self { pool };
        backend.migrate().await?;
        Ok(backend)
    }

    /// Opens (creating if needed) the database file at `path` and runs migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::unavailable(format!("create {}: {e}", parent.display()))
            })?;
        }
        Self::connect(&format!("sqlite:{}?mode=rwc", path.to_string_lossy())).await
    }

    /// Applies pending migrations. Safe to call repeatedly.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::unavailable(format!("migrate: {e}")))
    }

    /// Inserts a plan, or updates name and amount if the id exists.
    pub async fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO plans (id, plan_name, plan_amount)
            VALUES (?, ?, ?)
            ON CONFLICT (id) DO UPDATE
                SET plan_name = excluded.plan_name,
                    plan_amount = excluded.plan_amount
            "#,
        )
        .bind(plan.id.0)
        .bind(&plan.name)
        .bind(plan.amount_cents)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn begin(&self) -> Result<Box<dyn Tx>, StoreError> {
        let tx = self.pool.begin().await.map_err(map_err)?;
        Ok(Box::new(SqliteTx { tx }))
    }
}

struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

type PlanRow = (i64, String, i64);
type SubscriptionRow = (i64, i64, DateTime<Utc>, DateTime<Utc>);

fn plan_from_row((id, name, amount_cents): PlanRow) -> Plan {
    Plan {
        id: PlanId(id),
        name,
        amount_cents,
    }
}

#[async_trait]
impl Tx for SqliteTx {
    async fn plan(&mut self, id: PlanId) -> Result<Option<Plan>, StoreError> {
        let row: Option<PlanRow> =
            sqlx::query_as("SELECT id, plan_name, plan_amount FROM plans WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_err)?;
        Ok(row.map(plan_from_row))
    }

    async fn plans(&mut self) -> Result<Vec<Plan>, StoreError> {
        let rows: Vec<PlanRow> =
            sqlx::query_as("SELECT id, plan_name, plan_amount FROM plans ORDER BY id")
                .fetch_all(&mut *self.tx)
                .await
                .map_err(map_err)?;
        Ok(rows.into_iter().map(plan_from_row).collect())
    }

    async fn active_subscription(
        &mut self,
        user: UserId,
    ) -> Result<Option<ActiveSubscription>, StoreError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            "SELECT user_id, plan_id, created_at, updated_at FROM user_plans WHERE user_id = ?",
        )
        .bind(user.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_err)?;

        Ok(row.map(
            |(user_id, plan_id, created_at, updated_at)| ActiveSubscription {
                user_id: UserId(user_id),
                plan_id: PlanId(plan_id),
                created_at,
                updated_at,
            },
        ))
    }

    async fn delete_subscription(&mut self, user: UserId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM user_plans WHERE user_id = ?")
            .bind(user.0)
            .execute(&mut *self.tx)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn insert_subscription(
        &mut self,
        user: UserId,
        plan: PlanId,
        now: DateTime<Utc>,
    ) -> Result<ActiveSubscription, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_plans (user_id, plan_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user.0)
        .bind(plan.0)
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(map_err)?;

        Ok(ActiveSubscription {
            user_id: user,
            plan_id: plan,
            created_at: now,
            updated_at: now,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let SqliteTx { tx } = *self;
        tx.commit().await.map_err(map_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let SqliteTx { tx } = *self;
        tx.rollback().await.map_err(map_err)
    }
}

fn map_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::conflict(db.message().to_string());
        }
        let primary = db
            .code()
            .and_then(|c| c.parse::<i32>().ok())
            .map(|c| c & 0xff);
        if matches!(primary, Some(SQLITE_BUSY | SQLITE_LOCKED)) {
            return StoreError::conflict(db.message().to_string());
        }
    }
    StoreError::unavailable(err.to_string())
}
