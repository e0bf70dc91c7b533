//! Stale-content monitor (§4.5 stale monitor).
//!
//! Periodically scans drafts sitting in `in_review` and publishes
//! `content_stale` for any that have gone untouched longer than the
//! configured threshold, so an operator dashboard can surface a nudge. The
//! monitor only raises an advisory event -- it never mutates a draft.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::domain::DraftStatus;
use crate::events::Event;
use crate::storage::drafts::{self, DraftFilters};

use super::Scheduler;

/// Start the periodic scan on its own background task. Returns immediately;
/// the task runs for the life of the process.
pub fn spawn(scheduler: Arc<Scheduler>) {
    tokio::spawn(async move {
        let interval_secs = scheduler.config().stale_scan_interval_minutes.max(1) * 60;
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = scan_once(&scheduler).await {
                tracing::error!(error = %e, "stale content scan failed");
            }
        }
    });
}

/// Run a single scan pass. Exposed separately from [`spawn`] so tests can
/// drive it without waiting on the interval timer.
pub(super) async fn scan_once(scheduler: &Arc<Scheduler>) -> Result<(), crate::error::StorageError> {
    let threshold = chrono::Duration::hours(scheduler.config().stale_threshold_hours.max(0));
    let now = Utc::now();

    let in_review = drafts::list(
        &scheduler.pool,
        &DraftFilters {
            statuses: vec![DraftStatus::InReview],
            ..Default::default()
        },
    )
    .await?;

    for draft in in_review {
        let Ok(updated_at) = chrono::DateTime::parse_from_rfc3339(&draft.updated_at) else {
            continue;
        };
        let age = now - updated_at.with_timezone(&Utc);
        if age < threshold {
            continue;
        }

        scheduler.approval.event_bus().publish(Event::ContentStale {
            draft_id: draft.id.clone(),
            client_id: draft.client_id.clone(),
            // No client-name lookup exists in the client repository (§6
            // only exposes cadence/accounts/guardrails) -- fall back to the
            // id so subscribers still have something to render.
            client_name: draft.client_id.clone(),
            hours_stale: age.num_hours(),
        });
    }

    Ok(())
}
