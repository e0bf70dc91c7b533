//! The dispatch algorithm an armed fire runs once its sleep elapses (§4.5
//! executor).
//!
//! Every check below can send the entry back through
//! [`super::Scheduler::reschedule_without_retry`] instead of failing it --
//! only a real dispatch attempt consumes retry budget.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::adapters::PublishRequest;
use crate::domain::QueueStatus;
use crate::error::{AdapterError, SchedulerError};
use crate::events::Event;
use crate::storage::queue::UpdateOutcome;
use crate::storage::{clients, drafts, global_state, queue};

use super::Scheduler;

/// Run one queue entry's dispatch attempt (§4.5 steps 1-8).
pub(super) async fn run(scheduler: &Arc<Scheduler>, entry_id: &str) -> Result<(), SchedulerError> {
    let Some(entry) = queue::get(&scheduler.pool, entry_id).await? else {
        return Ok(());
    };

    // Step 1: only a still-queued entry is this task's to run. A cancel or a
    // prior fire (e.g. after a crash-restart double rehydration) may have
    // already moved it on.
    if entry.status != QueueStatus::Queued {
        return Ok(());
    }

    // Step 2: respect a global pause without spending a retry.
    let publish_state = global_state::get(&scheduler.pool).await?;
    if publish_state.paused {
        let retry_at = Utc::now() + chrono::Duration::seconds(60);
        return scheduler.reschedule_without_retry(&entry, retry_at).await;
    }

    // Step 3: respect the platform's rate-limit window without spending a
    // retry -- the slot was legitimate when cadence resolved it, but another
    // client's dispatch may have consumed it since.
    if !scheduler.rate_limiter.can_publish(entry.platform) {
        let next = scheduler.rate_limiter.next_available(entry.platform);
        return scheduler.reschedule_without_retry(&entry, next).await;
    }

    let Some(draft) = drafts::get(&scheduler.pool, &entry.draft_id).await? else {
        return scheduler.fail_entry_with_reason(&entry, "draft_missing").await;
    };

    // Step 4: a platform that requires an image but has none recorded fails
    // outright -- there is nothing a retry would fix.
    let image_ref = entry.image_ref.clone().or_else(|| draft.image_ref.clone());
    if draft.platform.requires_image(draft.image_prompt.is_some()) && image_ref.is_none() {
        return scheduler.fail_entry_with_reason(&entry, "image_missing").await;
    }

    // Step 5: reserve the entry so a concurrent cancel or a second fire of
    // this same task can't race the dispatch below.
    let reserved = queue::update_atomic(&scheduler.pool, &entry.id, Some(QueueStatus::Queued), |e| {
        e.status = QueueStatus::Publishing;
    })
    .await?;

    let entry = match reserved {
        UpdateOutcome::Updated(entry) => entry,
        UpdateOutcome::NotFound | UpdateOutcome::PreconditionFailed { .. } => return Ok(()),
    };

    let accounts = clients::get_platform_accounts(&scheduler.pool, &entry.client_id).await?;
    let account_id = match entry.platform {
        crate::domain::Platform::Facebook => accounts.as_ref().and_then(|a| a.facebook_id.clone()),
        crate::domain::Platform::Instagram => accounts.as_ref().and_then(|a| a.instagram_id.clone()),
    }
    .unwrap_or_default();

    let request = PublishRequest {
        account_id: &account_id,
        body: &draft.body,
        hashtags: &draft.hashtags,
        image_ref: image_ref.as_deref(),
    };

    // Step 6: dispatch, bounded by the configured timeout. A timeout is
    // treated the same as a transient adapter error -- it gets a retry.
    let adapter = scheduler.adapters.get(entry.platform);
    let dispatch_result = tokio::time::timeout(
        Duration::from_secs(scheduler.config().dispatch_timeout_seconds),
        adapter.publish(request),
    )
    .await
    .unwrap_or_else(|_| {
        Err(AdapterError::Transient {
            platform: entry.platform.as_str().to_string(),
            message: "dispatch timed out".to_string(),
        })
    });

    match dispatch_result {
        Ok(outcome) => handle_success(scheduler, &entry, outcome).await,
        Err(err @ (AdapterError::Permanent { .. } | AdapterError::Unsupported { .. })) => {
            scheduler.fail_entry_with_reason(&entry, &err.to_string()).await
        }
        Err(err @ AdapterError::Transient { .. }) => {
            scheduler.handle_dispatch_failure(&entry, err.to_string()).await
        }
    }
}

/// Step 7: a successful dispatch records the rate-limiter timestamp, moves
/// the queue entry to `published`, and hands the draft back to C3 so it can
/// transition `approved -> published`.
async fn handle_success(
    scheduler: &Arc<Scheduler>,
    entry: &crate::storage::queue::QueueEntry,
    outcome: crate::adapters::PublishOutcome,
) -> Result<(), SchedulerError> {
    scheduler.rate_limiter.record(entry.platform, Utc::now());

    let post_id = outcome.post_id.clone();
    let post_url = outcome.post_url.clone();

    queue::update_atomic(&scheduler.pool, &entry.id, Some(QueueStatus::Publishing), {
        let post_id = post_id.clone();
        let post_url = post_url.clone();
        move |e| {
            e.status = QueueStatus::Published;
            e.platform_post_id = Some(post_id);
            e.platform_post_url = Some(post_url);
        }
    })
    .await?;

    crate::storage::scheduler_store::mark_fired(&scheduler.scheduler_pool, &entry.id).await?;

    scheduler
        .approval
        .mark_published(&entry.draft_id, post_id.clone(), post_url.clone())
        .await?;

    scheduler.approval.event_bus().publish(Event::PublishComplete {
        draft_id: entry.draft_id.clone(),
        client_id: entry.client_id.clone(),
        platform: entry.platform,
        url: post_url,
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    // Covered end-to-end by `super::super::tests`, which exercises `run`
    // through `Scheduler`'s armed fire tasks with a scripted adapter.
}
