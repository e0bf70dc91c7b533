//! The narrow interface the approval service (C3) uses to hand a freshly
//! approved draft off to the scheduler (C5) without depending on its full
//! implementation -- `ApprovalService` and `Scheduler` each need a handle to
//! the other (approval creates queue entries through the scheduler; the
//! scheduler marks drafts published through approval), so the dependency is
//! broken by having `ApprovalService` depend only on this trait, attached
//! after both are constructed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Platform, PublishMode};
use crate::error::SchedulerError;
use crate::storage::queue::QueueEntry;

/// Implemented by [`crate::scheduler::Scheduler`].
#[async_trait]
pub trait SchedulingPort: Send + Sync {
    /// Create (cadence- and rate-limit-adjusted) a queue entry for a draft
    /// that just reached `approved` with `publish_mode = auto`.
    async fn schedule(
        &self,
        draft_id: &str,
        client_id: &str,
        platform: Platform,
        requested_at: Option<DateTime<Utc>>,
        publish_mode: PublishMode,
        image_ref: Option<&str>,
    ) -> Result<QueueEntry, SchedulerError>;

    /// Cancel a pending queue entry (e.g. an edit pulled its draft back to
    /// `in_review`).
    async fn cancel(&self, entry_id: &str) -> Result<(), SchedulerError>;
}
