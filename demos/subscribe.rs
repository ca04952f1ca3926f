//! # Example: subscribe
//!
//! End-to-end subscribe flow against a SQLite file.
//!
//! Shows how to:
//! - Load [`Config`] from the environment and start a [`Pipeline`].
//! - Open a [`SqliteBackend`] and seed plans.
//! - Run [`checkout::subscribe_to_plan`] twice (the second call replaces the first plan).
//! - Shut down on Ctrl-C / SIGTERM with the configured grace.
//!
//! ## Flow
//! ```text
//! subscribe_to_plan(user 42, plan 1) ──► Replace ──► enqueue invoice + manual
//! subscribe_to_plan(user 42, plan 7) ──► Replace ──► enqueue invoice + manual
//!                                                        └─► workers ──► LogMailer
//! SIGINT ──► Pipeline::run_until_signal ──► drain ──► exit
//! ```
//!
//! ## Run
//! ```bash
//! LOG_LEVEL=debug cargo run --example subscribe
//! ```

use membervisor::{
    Config, Pipeline, Plan, PlanId, SqliteBackend, SubscriptionStore, UserId, UserSnapshot,
    checkout,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = Config::from_env()?;
    let pipeline = Pipeline::start(cfg);

    let backend = SqliteBackend::from_path(".data/membership.db").await?;
    for (id, name, amount_cents) in [(1, "Bronze", 1000), (7, "Gold", 3000)] {
        backend
            .insert_plan(&Plan {
                id: PlanId(id),
                name: name.into(),
                amount_cents,
            })
            .await?;
    }
    let store = SubscriptionStore::new(backend);

    let user = UserSnapshot {
        id: UserId(42),
        email: "admin@example.com".into(),
        first_name: "Admin".into(),
        last_name: "User".into(),
    };

    let queue = pipeline.queue();
    for plan in [PlanId(1), PlanId(7)] {
        let done = checkout::subscribe_to_plan(&store, &queue, &user, plan).await?;
        info!(
            plan = %done.plan.name,
            enqueued = done.enqueued.len(),
            skipped = done.skipped.len(),
            "subscribed"
        );
    }

    let active = store.active(user.id).await?;
    info!(?active, "current subscription");

    info!("press Ctrl-C to stop");
    let report = pipeline.run_until_signal().await?;
    info!(?report, "pipeline stopped");
    Ok(())
}
