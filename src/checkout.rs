//! # Subscribe flow used by request handlers.
//!
//! [`subscribe_to_plan`] is the whole "user picks a plan" request:
//!
//! 1. `Replace(user, plan)` must commit; on error nothing is enqueued and the
//!    error goes back to the handler.
//! 2. Only then are the invoice and manual jobs enqueued, carrying the plan as
//!    read inside the committed transaction. The manual renders under the
//!    queue's configured [`manual_dir`](NotificationQueue::manual_dir).
//! 3. An enqueue failure does not undo the subscription; it is returned in
//!    [`Subscribed::skipped`] so the handler can tell the user an email may be late.

use tracing::{info, warn};

use crate::core::NotificationQueue;
use crate::error::{EnqueueError, StoreError};
use crate::jobs::{JobId, JobKind, NotificationJob};
use crate::model::{Plan, PlanId, UserSnapshot};
use crate::store::{ActiveSubscription, SubscriptionStore};

/// Result of a successful subscribe request.
#[derive(Debug, Clone)]
pub struct Subscribed {
    pub subscription: ActiveSubscription,
    pub plan: Plan,
    /// Notifications accepted by the queue.
    pub enqueued: Vec<JobId>,
    /// Notifications that could not be queued.
    pub skipped: Vec<(JobKind, EnqueueError)>,
}

impl Subscribed {
    /// Whether every notification was queued.
    pub fn fully_enqueued(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Replaces the user's plan, then queues the invoice and the manual.
pub async fn subscribe_to_plan(
    store: &SubscriptionStore,
    queue: &NotificationQueue,
    user: &UserSnapshot,
    plan: PlanId,
) -> Result<Subscribed, StoreError> {
    let (subscription, plan) = store.replace_returning_plan(user.id, plan).await?;

    let jobs = [
        NotificationJob::invoice(user, &plan),
        NotificationJob::manual(user, &plan, queue.manual_dir()),
    ];
    let mut enqueued = Vec::with_capacity(jobs.len());
    let mut skipped = Vec::new();
    for job in jobs {
        let kind = job.kind();
        match queue.enqueue(job).await {
            Ok(id) => enqueued.push(id),
            Err(e) => {
                warn!(
                    user_id = %user.id,
                    kind = kind.as_label(),
                    label = e.as_label(),
                    "notification skipped"
                );
                skipped.push((kind, e));
            }
        }
    }

    info!(
        user_id = %user.id,
        plan_id = %plan.id,
        enqueued = enqueued.len(),
        skipped = skipped.len(),
        "user subscribed"
    );
    Ok(Subscribed {
        subscription,
        plan,
        enqueued,
        skipped,
    })
}
