//! Approval state machine (§4.3) -- the semantic heart of the core.
//!
//! `ApprovalService` is the single owning module for draft mutation
//! (§9 design notes): every other component holds only a draft id and reads
//! through [`crate::storage::drafts::get`]; all writes funnel through
//! [`ApprovalService::transition`]. Mutation intent is passed as an explicit
//! tagged value (`TransitionRequest`) rather than expressed as a verb at the
//! call site.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::domain::{Actor, DraftStatus, PublishMode};
use crate::error::TransitionError;
use crate::events::{Event, EventBus};
use crate::scheduling::SchedulingPort;
use crate::storage::drafts::{self, Draft, EditEntry, UpdateOutcome};
use crate::storage::util::now_rfc3339;
use crate::storage::{queue, DbPool};

/// What a caller wants done to a draft, and the data that transition needs.
/// Mirrors the transition table in §4.3 one variant per trigger.
#[derive(Debug, Clone)]
pub enum TransitionRequest {
    /// `draft -> in_review`, raised by the external generation pipeline once
    /// a draft has cleared quality gates and is ready for operator eyes.
    Intake,
    /// `in_review -> approved`.
    Approve {
        publish_mode: PublishMode,
        custom_post_time: Option<String>,
    },
    /// `in_review -> rejected`.
    Reject {
        tags: Vec<String>,
        guidance: Option<String>,
    },
    /// `approved -> in_review` (re-edit) or `in_review -> in_review` is not
    /// valid; edits on an `approved` draft fall back to `in_review` and the
    /// pending queue entry is paused (§4.3 edge-case policies).
    Edit {
        new_copy: String,
        custom_post_time: Option<String>,
    },
    /// `in_review -> skipped`.
    Skip,
    /// `rejected -> in_review` or `skipped -> in_review`: operator
    /// reconsiders / resubmits after regeneration.
    Resubmit,
    /// `approved -> published`, driven by the scheduler/executor (C5) after
    /// a successful platform dispatch.
    MarkPublished {
        platform_post_id: String,
        platform_post_url: String,
    },
    /// `approved -> published` for `publish_mode = manual` drafts: the
    /// operator confirms they copy-pasted the content themselves. No
    /// platform dispatch, no queue entry.
    ManualPublishConfirm,
    /// `published -> recovered`, raised by the recovery service (C6) after
    /// a successful (or unsupported-but-accepted) takedown.
    Recover,
    /// `recovered -> in_review`: a replacement draft has been linked.
    ReplacementLinked,
}

impl TransitionRequest {
    fn target(&self) -> DraftStatus {
        match self {
            TransitionRequest::Intake => DraftStatus::InReview,
            TransitionRequest::Approve { .. } => DraftStatus::Approved,
            TransitionRequest::Reject { .. } => DraftStatus::Rejected,
            TransitionRequest::Edit { .. } => DraftStatus::InReview,
            TransitionRequest::Skip => DraftStatus::Skipped,
            TransitionRequest::Resubmit => DraftStatus::InReview,
            TransitionRequest::MarkPublished { .. } => DraftStatus::Published,
            TransitionRequest::ManualPublishConfirm => DraftStatus::Published,
            TransitionRequest::Recover => DraftStatus::Recovered,
            TransitionRequest::ReplacementLinked => DraftStatus::InReview,
        }
    }

    fn action_label(&self) -> &'static str {
        match self {
            TransitionRequest::Intake => "intake",
            TransitionRequest::Approve { .. } => "approve",
            TransitionRequest::Reject { .. } => "reject",
            TransitionRequest::Edit { .. } => "edit",
            TransitionRequest::Skip => "skip",
            TransitionRequest::Resubmit => "resubmit",
            TransitionRequest::MarkPublished { .. } => "publish",
            TransitionRequest::ManualPublishConfirm => "manual_publish_confirm",
            TransitionRequest::Recover => "recover",
            TransitionRequest::ReplacementLinked => "replacement_linked",
        }
    }
}

/// The allowed-transitions table (§4.3). Any pair not listed here is
/// rejected with `InvalidTransition` regardless of what the caller asked
/// for -- this is the enforcement point for Invariant 1 (no draft reaches
/// `published` without first having been `approved`).
fn is_allowed(from: DraftStatus, to: DraftStatus) -> bool {
    matches!(
        (from, to),
        (DraftStatus::Draft, DraftStatus::InReview)
            | (DraftStatus::InReview, DraftStatus::Approved)
            | (DraftStatus::InReview, DraftStatus::Rejected)
            | (DraftStatus::InReview, DraftStatus::Skipped)
            | (DraftStatus::Approved, DraftStatus::InReview)
            | (DraftStatus::Approved, DraftStatus::Published)
            | (DraftStatus::Rejected, DraftStatus::InReview)
            | (DraftStatus::Skipped, DraftStatus::InReview)
            | (DraftStatus::Published, DraftStatus::Recovered)
            | (DraftStatus::Recovered, DraftStatus::InReview)
    )
}

/// Mediates every status write a draft can undergo (§4.3).
pub struct ApprovalService {
    pool: DbPool,
    bus: Arc<EventBus>,
    scheduler: RwLock<Option<Arc<dyn SchedulingPort>>>,
}

impl ApprovalService {
    pub fn new(pool: DbPool, bus: Arc<EventBus>) -> Self {
        ApprovalService {
            pool,
            bus,
            scheduler: RwLock::new(None),
        }
    }

    /// Attach the scheduler once it has been constructed. `ApprovalService`
    /// and `Scheduler` each hold a handle to the other, so this is wired
    /// after both exist rather than at construction time.
    pub fn attach_scheduler(&self, scheduler: Arc<dyn SchedulingPort>) {
        *self.scheduler.write().expect("approval scheduler lock poisoned") = Some(scheduler);
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Apply `request` to `draft_id`, following the algorithm in §4.3:
    /// load under lock, check the transition table, apply edits, commit
    /// draft + audit record + (on approval) queue entries in one
    /// transaction, then publish the advisory event outside it.
    pub async fn transition(
        &self,
        draft_id: &str,
        request: TransitionRequest,
        actor: Actor,
    ) -> Result<Draft, TransitionError> {
        let current = drafts::get(&self.pool, draft_id)
            .await?
            .ok_or_else(|| TransitionError::NotFound {
                draft_id: draft_id.to_string(),
            })?;

        let from = current.status;
        let to = request.target();

        if !is_allowed(from, to) {
            return Err(TransitionError::InvalidTransition {
                draft_id: draft_id.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let action = request.action_label();
        let actor_str = actor.to_string();
        let request_for_mutator = request.clone_for_mutation();

        let outcome = drafts::update_atomic(
            &self.pool,
            draft_id,
            Some(from),
            move |draft| apply_request(draft, &request_for_mutator, &actor_str),
            &actor_str,
            action,
        )
        .await?;

        let updated = match outcome {
            UpdateOutcome::Updated(draft) => draft,
            UpdateOutcome::NotFound => {
                return Err(TransitionError::NotFound {
                    draft_id: draft_id.to_string(),
                })
            }
            UpdateOutcome::PreconditionFailed { .. } => {
                return Err(TransitionError::Conflict {
                    draft_id: draft_id.to_string(),
                })
            }
        };

        // Queue-entry side effects (Invariant 3 and 4): created on approval
        // for auto-publish drafts; paused when an edit pulls an approved
        // draft back to in_review. Routed through the attached scheduler
        // when one is wired (it applies cadence/rate-limit adjustment and
        // arms the fire); falls back to a direct, unadjusted insert so this
        // service is independently testable without a scheduler.
        match &request {
            TransitionRequest::Approve { publish_mode, custom_post_time } if *publish_mode == PublishMode::Auto => {
                let requested_at = custom_post_time
                    .as_deref()
                    .or(updated.suggested_post_time.as_deref())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc));

                let scheduler = self.scheduler.read().expect("approval scheduler lock poisoned").clone();
                if let Some(scheduler) = scheduler {
                    scheduler
                        .schedule(
                            &updated.id,
                            &updated.client_id,
                            updated.platform,
                            requested_at,
                            *publish_mode,
                            updated.image_ref.as_deref(),
                        )
                        .await?;
                } else {
                    queue::insert(
                        &self.pool,
                        &updated.id,
                        &updated.client_id,
                        updated.platform,
                        updated.custom_post_time.as_deref().unwrap_or_else(|| {
                            updated
                                .suggested_post_time
                                .as_deref()
                                .unwrap_or(&updated.updated_at)
                        }),
                        *publish_mode,
                        updated.image_ref.as_deref(),
                    )
                    .await?;
                }
            }
            TransitionRequest::Edit { .. } if from == DraftStatus::Approved => {
                let scheduler = self.scheduler.read().expect("approval scheduler lock poisoned").clone();
                for entry in queue::for_draft(&self.pool, &updated.id).await? {
                    if entry.status != crate::domain::QueueStatus::Queued {
                        continue;
                    }
                    if let Some(scheduler) = &scheduler {
                        scheduler.cancel(&entry.id).await?;
                    } else {
                        queue::update_atomic(
                            &self.pool,
                            &entry.id,
                            Some(crate::domain::QueueStatus::Queued),
                            |e| e.status = crate::domain::QueueStatus::Paused,
                        )
                        .await?;
                    }
                }
            }
            _ => {}
        }

        // Event publication happens after commit and is advisory only --
        // the database write above is already durable (§4.3 step 5).
        match &request {
            TransitionRequest::MarkPublished { .. } | TransitionRequest::ManualPublishConfirm => {
                self.bus.publish(Event::ApprovalChanged {
                    draft_id: updated.id.clone(),
                    client_id: updated.client_id.clone(),
                    old_status: from,
                    new_status: to,
                });
            }
            TransitionRequest::Recover => {
                // RecoveryService publishes `recovery_complete` itself with
                // the richer recovery-log status; avoid a duplicate event.
            }
            _ => {
                self.bus.publish(Event::ApprovalChanged {
                    draft_id: updated.id.clone(),
                    client_id: updated.client_id.clone(),
                    old_status: from,
                    new_status: to,
                });
            }
        }

        Ok(updated)
    }

    /// Convenience wrapper: `in_review -> approved`.
    pub async fn approve(
        &self,
        draft_id: &str,
        actor: Actor,
        publish_mode: PublishMode,
        custom_post_time: Option<String>,
    ) -> Result<Draft, TransitionError> {
        self.transition(
            draft_id,
            TransitionRequest::Approve {
                publish_mode,
                custom_post_time,
            },
            actor,
        )
        .await
    }

    /// Convenience wrapper: `in_review -> rejected`.
    pub async fn reject(
        &self,
        draft_id: &str,
        actor: Actor,
        tags: Vec<String>,
        guidance: Option<String>,
    ) -> Result<Draft, TransitionError> {
        self.transition(draft_id, TransitionRequest::Reject { tags, guidance }, actor)
            .await
    }

    /// Convenience wrapper: edits a draft's copy. On an `approved` draft
    /// this forces the fallback to `in_review` and pauses its queue entry
    /// (§4.3 edge-case policies); on `in_review` it edits in place.
    pub async fn edit(
        &self,
        draft_id: &str,
        actor: Actor,
        new_copy: String,
        custom_post_time: Option<String>,
    ) -> Result<Draft, TransitionError> {
        let current = drafts::get(&self.pool, draft_id)
            .await?
            .ok_or_else(|| TransitionError::NotFound {
                draft_id: draft_id.to_string(),
            })?;

        if current.status == DraftStatus::InReview {
            return self
                .edit_in_place(draft_id, actor, new_copy, custom_post_time)
                .await;
        }

        self.transition(
            draft_id,
            TransitionRequest::Edit {
                new_copy,
                custom_post_time,
            },
            actor,
        )
        .await
    }

    /// Edit a draft that is already `in_review`, which is not a status
    /// transition at all (`in_review -> in_review` is not in the table) but
    /// still needs its own audit record.
    async fn edit_in_place(
        &self,
        draft_id: &str,
        actor: Actor,
        new_copy: String,
        custom_post_time: Option<String>,
    ) -> Result<Draft, TransitionError> {
        let actor_str = actor.to_string();
        let outcome = drafts::update_atomic(
            &self.pool,
            draft_id,
            Some(DraftStatus::InReview),
            move |draft| record_edit(draft, new_copy, custom_post_time, &actor_str),
            &actor.to_string(),
            "edit",
        )
        .await?;

        match outcome {
            UpdateOutcome::Updated(draft) => Ok(draft),
            UpdateOutcome::NotFound => Err(TransitionError::NotFound {
                draft_id: draft_id.to_string(),
            }),
            UpdateOutcome::PreconditionFailed { .. } => Err(TransitionError::Conflict {
                draft_id: draft_id.to_string(),
            }),
        }
    }

    /// Convenience wrapper: `in_review -> skipped`.
    pub async fn skip(&self, draft_id: &str, actor: Actor) -> Result<Draft, TransitionError> {
        self.transition(draft_id, TransitionRequest::Skip, actor).await
    }

    /// Convenience wrapper: `rejected | skipped -> in_review`.
    pub async fn resubmit(&self, draft_id: &str, actor: Actor) -> Result<Draft, TransitionError> {
        self.transition(draft_id, TransitionRequest::Resubmit, actor).await
    }

    /// Called by C5 after a successful dispatch: `approved -> published`.
    pub async fn mark_published(
        &self,
        draft_id: &str,
        platform_post_id: String,
        platform_post_url: String,
    ) -> Result<Draft, TransitionError> {
        self.transition(
            draft_id,
            TransitionRequest::MarkPublished {
                platform_post_id,
                platform_post_url,
            },
            Actor::SophiaPublisher,
        )
        .await
    }

    /// Called by C6 after a successful (or accepted-unsupported) recovery:
    /// `published -> recovered`.
    pub async fn recover(&self, draft_id: &str, actor: Actor) -> Result<Draft, TransitionError> {
        self.transition(draft_id, TransitionRequest::Recover, actor).await
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}

impl TransitionRequest {
    fn clone_for_mutation(&self) -> TransitionRequest {
        self.clone()
    }
}

fn apply_request(draft: &mut Draft, request: &TransitionRequest, actor: &str) {
    draft.status = request.target();

    match request {
        TransitionRequest::Approve {
            publish_mode,
            custom_post_time,
        } => {
            draft.publish_mode = *publish_mode;
            draft.approved_at = Some(now_rfc3339());
            draft.approved_by = Some(actor.to_string());
            if custom_post_time.is_some() {
                draft.custom_post_time = custom_post_time.clone();
            }
        }
        TransitionRequest::Edit {
            new_copy,
            custom_post_time,
        } => {
            record_edit_fields(draft, new_copy.clone(), custom_post_time.clone(), actor);
        }
        TransitionRequest::MarkPublished {
            platform_post_id,
            platform_post_url,
        } => {
            draft.platform_post_id = Some(platform_post_id.clone());
            draft.platform_post_url = Some(platform_post_url.clone());
        }
        TransitionRequest::ManualPublishConfirm
        | TransitionRequest::Reject { .. }
        | TransitionRequest::Skip
        | TransitionRequest::Resubmit
        | TransitionRequest::Recover
        | TransitionRequest::ReplacementLinked
        | TransitionRequest::Intake => {}
    }
}

fn record_edit_fields(draft: &mut Draft, new_copy: String, custom_post_time: Option<String>, actor: &str) {
    draft.edit_history.push(EditEntry {
        at: now_rfc3339(),
        actor: actor.to_string(),
        previous_body: draft.body.clone(),
    });
    draft.body = new_copy;
    if custom_post_time.is_some() {
        draft.custom_post_time = custom_post_time;
    }
}

fn record_edit(draft: &mut Draft, new_copy: String, custom_post_time: Option<String>, actor: &str) {
    record_edit_fields(draft, new_copy, custom_post_time, actor);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Platform;
    use crate::storage::drafts::NewDraft;
    use crate::storage::init_test_db;

    async fn service_with_draft() -> (ApprovalService, Draft) {
        let pool = init_test_db().await.unwrap();
        let bus = Arc::new(EventBus::new(16, 32));
        let draft = drafts::insert(
            &pool,
            NewDraft {
                client_id: "client-1".to_string(),
                platform: Platform::Facebook,
                body: "hello".to_string(),
                image_prompt: None,
                hashtags: vec![],
                image_ref: None,
                suggested_post_time: Some("2026-08-01T12:00:00Z".to_string()),
                qa_report: None,
                voice_alignment_score: None,
                publish_mode: PublishMode::Auto,
            },
        )
        .await
        .unwrap();
        (ApprovalService::new(pool, bus), draft)
    }

    #[tokio::test]
    async fn intake_then_approve_creates_queue_entry() {
        let (svc, draft) = service_with_draft().await;
        svc.transition(&draft.id, TransitionRequest::Intake, Actor::SophiaPublisher)
            .await
            .unwrap();

        let approved = svc
            .approve(&draft.id, Actor::OperatorWeb, PublishMode::Auto, None)
            .await
            .unwrap();
        assert_eq!(approved.status, DraftStatus::Approved);

        let entries = queue::for_draft(svc.pool(), &draft.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, crate::domain::QueueStatus::Queued);
    }

    #[tokio::test]
    async fn manual_publish_mode_creates_no_queue_entry() {
        let (svc, draft) = service_with_draft().await;
        svc.transition(&draft.id, TransitionRequest::Intake, Actor::SophiaPublisher)
            .await
            .unwrap();
        svc.approve(&draft.id, Actor::OperatorWeb, PublishMode::Manual, None)
            .await
            .unwrap();

        let entries = queue::for_draft(svc.pool(), &draft.id).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let (svc, draft) = service_with_draft().await;
        // draft is still in `draft`, not `in_review`; approve must fail.
        let err = svc
            .approve(&draft.id, Actor::OperatorWeb, PublishMode::Auto, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn no_path_from_rejected_to_published() {
        let (svc, draft) = service_with_draft().await;
        svc.transition(&draft.id, TransitionRequest::Intake, Actor::SophiaPublisher)
            .await
            .unwrap();
        svc.reject(&draft.id, Actor::OperatorWeb, vec!["off-brand".to_string()], None)
            .await
            .unwrap();

        let err = svc
            .transition(
                &draft.id,
                TransitionRequest::MarkPublished {
                    platform_post_id: "p1".to_string(),
                    platform_post_url: "https://example.com/p1".to_string(),
                },
                Actor::SophiaPublisher,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn editing_an_approved_draft_falls_back_to_in_review_and_pauses_queue() {
        let (svc, draft) = service_with_draft().await;
        svc.transition(&draft.id, TransitionRequest::Intake, Actor::SophiaPublisher)
            .await
            .unwrap();
        svc.approve(&draft.id, Actor::OperatorWeb, PublishMode::Auto, None)
            .await
            .unwrap();

        let edited = svc
            .edit(&draft.id, Actor::OperatorWeb, "revised copy".to_string(), None)
            .await
            .unwrap();
        assert_eq!(edited.status, DraftStatus::InReview);
        assert_eq!(edited.body, "revised copy");

        let entries = queue::for_draft(svc.pool(), &draft.id).await.unwrap();
        assert_eq!(entries[0].status, crate::domain::QueueStatus::Paused);
    }

    #[tokio::test]
    async fn editing_an_in_review_draft_stays_in_review() {
        let (svc, draft) = service_with_draft().await;
        svc.transition(&draft.id, TransitionRequest::Intake, Actor::SophiaPublisher)
            .await
            .unwrap();

        let edited = svc
            .edit(&draft.id, Actor::OperatorWeb, "tweaked".to_string(), None)
            .await
            .unwrap();
        assert_eq!(edited.status, DraftStatus::InReview);
        assert_eq!(edited.edit_history.len(), 1);
    }

    #[tokio::test]
    async fn reject_then_reapprove_reaches_same_outward_state_as_direct_approve() {
        let (svc, draft) = service_with_draft().await;
        svc.transition(&draft.id, TransitionRequest::Intake, Actor::SophiaPublisher)
            .await
            .unwrap();
        svc.reject(&draft.id, Actor::OperatorWeb, vec![], None).await.unwrap();
        svc.resubmit(&draft.id, Actor::OperatorWeb).await.unwrap();
        let approved = svc
            .approve(&draft.id, Actor::OperatorWeb, PublishMode::Auto, None)
            .await
            .unwrap();
        assert_eq!(approved.status, DraftStatus::Approved);
    }

    #[tokio::test]
    async fn concurrent_approve_race_yields_exactly_one_winner() {
        let (svc, draft) = service_with_draft().await;
        svc.transition(&draft.id, TransitionRequest::Intake, Actor::SophiaPublisher)
            .await
            .unwrap();

        let first = svc
            .approve(&draft.id, Actor::OperatorWeb, PublishMode::Auto, None)
            .await;
        let second = svc
            .approve(&draft.id, Actor::OperatorBot, PublishMode::Auto, None)
            .await;

        assert!(first.is_ok());
        assert!(matches!(second, Err(TransitionError::Conflict { .. })));

        let entries = queue::for_draft(svc.pool(), &draft.id).await.unwrap();
        assert_eq!(entries.len(), 1);
    }
}
