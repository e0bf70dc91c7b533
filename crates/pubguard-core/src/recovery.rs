//! Recovery service (C6, §4.6) -- post-publish takedown.
//!
//! Takes a `published` draft, records a recovery attempt, and asks the
//! owning platform's adapter to delete the live post. Instagram never
//! supports delete (§6), so that branch routes to `manual_recovery_needed`
//! rather than treating it as a failure: the operator is told to take the
//! post down by hand, not that the system tried and failed.

use std::sync::Arc;

use crate::adapters::AdapterRegistry;
use crate::approval::ApprovalService;
use crate::domain::{Actor, DraftStatus, RecoveryStatus, Urgency};
use crate::error::{AdapterError, RecoveryError};
use crate::events::{Event, EventBus};
use crate::storage::drafts;
use crate::storage::recovery::{self, RecoveryLog};
use crate::storage::{clients, DbPool};

/// Mediates post-publish takedown requests (§4.6).
pub struct RecoveryService {
    pool: DbPool,
    approval: Arc<ApprovalService>,
    adapters: Arc<AdapterRegistry>,
    bus: Arc<EventBus>,
}

impl RecoveryService {
    pub fn new(
        pool: DbPool,
        approval: Arc<ApprovalService>,
        adapters: Arc<AdapterRegistry>,
        bus: Arc<EventBus>,
    ) -> Self {
        RecoveryService {
            pool,
            approval,
            adapters,
            bus,
        }
    }

    /// Request that a published draft's live post be taken down (§4.6).
    ///
    /// 1. the draft must currently be `published`
    /// 2. a `pending` recovery log row is created
    /// 3. the owning adapter's `delete` is dispatched
    /// 4. on success the draft transitions `published -> recovered`
    /// 5. on `Unsupported` the draft stays `published`, logged as
    ///    `manual_recovery_needed` -- the operator must act by hand
    /// 6. on any other failure the draft stays `published`, logged `failed`
    ///
    /// A `recovery_complete` event fires in every outcome, carrying the
    /// recovery log's final status so subscribers can distinguish a clean
    /// takedown from one that still needs a human.
    pub async fn recover(
        &self,
        draft_id: &str,
        reason: &str,
        urgency: Urgency,
        actor: Actor,
    ) -> Result<RecoveryLog, RecoveryError> {
        let draft = drafts::get(&self.pool, draft_id)
            .await?
            .ok_or_else(|| RecoveryError::NotFound {
                draft_id: draft_id.to_string(),
            })?;

        if draft.status != DraftStatus::Published {
            return Err(RecoveryError::InvalidState {
                draft_id: draft_id.to_string(),
                actual: draft.status.to_string(),
            });
        }

        let platform_post_id = draft.platform_post_id.clone().ok_or_else(|| {
            RecoveryError::InvalidState {
                draft_id: draft_id.to_string(),
                actual: "published without a recorded platform post id".to_string(),
            }
        })?;

        let log = recovery::insert(
            &self.pool,
            &draft.id,
            &draft.client_id,
            draft.platform,
            &platform_post_id,
            urgency,
            reason,
            actor.as_str(),
        )
        .await?;

        recovery::mark_executing(&self.pool, &log.id).await?;

        let accounts = clients::get_platform_accounts(&self.pool, &draft.client_id).await?;
        let account_id = match draft.platform {
            crate::domain::Platform::Facebook => accounts.as_ref().and_then(|a| a.facebook_id.clone()),
            crate::domain::Platform::Instagram => {
                accounts.as_ref().and_then(|a| a.instagram_id.clone())
            }
        }
        .unwrap_or_default();

        let adapter = self.adapters.get(draft.platform);
        let dispatch_result = adapter.delete(&account_id, &platform_post_id).await;

        let (final_status, replacement_error) = match dispatch_result {
            Ok(()) => {
                self.approval.recover(&draft.id, actor).await.map_err(|e| {
                    tracing::error!(draft_id = %draft.id, error = %e, "recovery delete succeeded but draft transition failed");
                    RecoveryError::InvalidState {
                        draft_id: draft.id.clone(),
                        actual: draft.status.to_string(),
                    }
                })?;
                (RecoveryStatus::Completed, None)
            }
            Err(AdapterError::Unsupported { .. }) => (RecoveryStatus::ManualRecoveryNeeded, None),
            Err(err) => {
                tracing::warn!(draft_id = %draft.id, platform = %draft.platform, error = %err, "recovery dispatch failed");
                (RecoveryStatus::Failed, Some(err.to_string()))
            }
        };

        let completed = recovery::complete(&self.pool, &log.id, final_status, None)
            .await?
            .unwrap_or(log);

        self.bus.publish(Event::RecoveryComplete {
            draft_id: draft.id.clone(),
            client_id: draft.client_id.clone(),
            status: final_status.as_str().to_string(),
        });

        if let Some(message) = replacement_error {
            tracing::debug!(recovery_id = %completed.id, message, "recovery attempt recorded as failed");
        }

        Ok(completed)
    }

    /// Link a freshly generated replacement draft to a completed recovery
    /// attempt, and reopen the original draft for another review round
    /// (`recovered -> in_review`, §4.3 transition table).
    pub async fn link_replacement(
        &self,
        draft_id: &str,
        replacement_draft_id: &str,
        actor: Actor,
    ) -> Result<RecoveryLog, RecoveryError> {
        let log = recovery::latest_for_draft(&self.pool, draft_id)
            .await?
            .ok_or_else(|| RecoveryError::NotFound {
                draft_id: draft_id.to_string(),
            })?;

        let updated = recovery::set_replacement(&self.pool, &log.id, replacement_draft_id)
            .await?
            .ok_or_else(|| RecoveryError::InvalidState {
                draft_id: draft_id.to_string(),
                actual: log.status.to_string(),
            })?;

        self.approval
            .transition(
                draft_id,
                crate::approval::TransitionRequest::ReplacementLinked,
                actor,
            )
            .await
            .map_err(|e| {
                tracing::error!(draft_id, error = %e, "failed to reopen draft after linking replacement");
                RecoveryError::InvalidState {
                    draft_id: draft_id.to_string(),
                    actual: "recovered".to_string(),
                }
            })?;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Platform, PublishMode};
    use crate::error::AdapterError;
    use crate::storage::drafts::NewDraft;
    use crate::storage::init_test_db;
    use async_trait::async_trait;

    struct FakeAdapter {
        platform: Platform,
        result: std::sync::Mutex<Option<Result<(), AdapterError>>>,
    }

    #[async_trait]
    impl crate::adapters::PlatformAdapter for FakeAdapter {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn publish(
            &self,
            _request: crate::adapters::PublishRequest<'_>,
        ) -> Result<crate::adapters::PublishOutcome, AdapterError> {
            unimplemented!("not exercised by recovery tests")
        }

        async fn delete(&self, _account_id: &str, _post_id: &str) -> Result<(), AdapterError> {
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(AdapterError::Permanent {
                    platform: self.platform.as_str().to_string(),
                    message: "no result configured".to_string(),
                }))
        }
    }

    async fn published_draft(pool: &DbPool) -> drafts::Draft {
        let draft = drafts::insert(
            pool,
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

        crate::storage::drafts::update_atomic(
            pool,
            &draft.id,
            Some(DraftStatus::Draft),
            |d| d.status = DraftStatus::InReview,
            "sophia:publisher",
            "intake",
        )
        .await
        .unwrap();
        crate::storage::drafts::update_atomic(
            pool,
            &draft.id,
            Some(DraftStatus::InReview),
            |d| {
                d.status = DraftStatus::Approved;
                d.publish_mode = PublishMode::Auto;
            },
            "operator:web",
            "approve",
        )
        .await
        .unwrap();
        let outcome = crate::storage::drafts::update_atomic(
            pool,
            &draft.id,
            Some(DraftStatus::Approved),
            |d| {
                d.status = DraftStatus::Published;
                d.platform_post_id = Some("post-1".to_string());
                d.platform_post_url = Some("https://facebook.com/post-1".to_string());
            },
            "sophia:publisher",
            "publish",
        )
        .await
        .unwrap();

        match outcome {
            crate::storage::drafts::UpdateOutcome::Updated(d) => d,
            _ => panic!("expected update"),
        }
    }

    fn harness(
        pool: DbPool,
        facebook_result: Result<(), AdapterError>,
    ) -> RecoveryService {
        let bus = Arc::new(EventBus::new(16, 32));
        let approval = Arc::new(ApprovalService::new(pool.clone(), bus.clone()));
        let facebook = Arc::new(FakeAdapter {
            platform: Platform::Facebook,
            result: std::sync::Mutex::new(Some(facebook_result)),
        });
        let instagram = Arc::new(FakeAdapter {
            platform: Platform::Instagram,
            result: std::sync::Mutex::new(Some(Err(AdapterError::Unsupported {
                platform: "instagram".to_string(),
                operation: "delete".to_string(),
            }))),
        });
        let adapters = Arc::new(AdapterRegistry::new(facebook, instagram));
        RecoveryService::new(pool, approval, adapters, bus)
    }

    #[tokio::test]
    async fn successful_delete_transitions_draft_to_recovered() {
        let pool = init_test_db().await.unwrap();
        let draft = published_draft(&pool).await;
        let svc = harness(pool.clone(), Ok(()));

        let log = svc
            .recover(&draft.id, "duplicate content", Urgency::Immediate, Actor::OperatorWeb)
            .await
            .unwrap();
        assert_eq!(log.status, RecoveryStatus::Completed);

        let reloaded = drafts::get(&pool, &draft.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, DraftStatus::Recovered);
    }

    #[tokio::test]
    async fn unsupported_delete_is_manual_recovery_needed_and_leaves_draft_published() {
        let pool = init_test_db().await.unwrap();
        let draft = drafts::insert(
            &pool,
            NewDraft {
                client_id: "client-1".to_string(),
                platform: Platform::Instagram,
                body: "hello".to_string(),
                image_prompt: None,
                hashtags: vec![],
                image_ref: Some("https://example.com/img.png".to_string()),
                suggested_post_time: Some("2026-08-01T12:00:00Z".to_string()),
                qa_report: None,
                voice_alignment_score: None,
                publish_mode: PublishMode::Auto,
            },
        )
        .await
        .unwrap();
        crate::storage::drafts::update_atomic(
            &pool,
            &draft.id,
            Some(DraftStatus::Draft),
            |d| d.status = DraftStatus::InReview,
            "sophia:publisher",
            "intake",
        )
        .await
        .unwrap();
        crate::storage::drafts::update_atomic(
            &pool,
            &draft.id,
            Some(DraftStatus::InReview),
            |d| d.status = DraftStatus::Approved,
            "operator:web",
            "approve",
        )
        .await
        .unwrap();
        crate::storage::drafts::update_atomic(
            &pool,
            &draft.id,
            Some(DraftStatus::Approved),
            |d| {
                d.status = DraftStatus::Published;
                d.platform_post_id = Some("ig-post-1".to_string());
                d.platform_post_url = Some("https://instagram.com/p/ig-post-1".to_string());
            },
            "sophia:publisher",
            "publish",
        )
        .await
        .unwrap();

        let svc = harness(pool.clone(), Ok(()));
        let log = svc
            .recover(&draft.id, "brand issue", Urgency::Review, Actor::OperatorWeb)
            .await
            .unwrap();
        assert_eq!(log.status, RecoveryStatus::ManualRecoveryNeeded);

        let reloaded = drafts::get(&pool, &draft.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, DraftStatus::Published);
    }

    #[tokio::test]
    async fn recovery_on_non_published_draft_is_rejected() {
        let pool = init_test_db().await.unwrap();
        let draft = drafts::insert(
            &pool,
            NewDraft {
                client_id: "client-1".to_string(),
                platform: Platform::Facebook,
                body: "hello".to_string(),
                image_prompt: None,
                hashtags: vec![],
                image_ref: None,
                suggested_post_time: None,
                qa_report: None,
                voice_alignment_score: None,
                publish_mode: PublishMode::Auto,
            },
        )
        .await
        .unwrap();

        let svc = harness(pool, Ok(()));
        let err = svc
            .recover(&draft.id, "n/a", Urgency::Review, Actor::OperatorWeb)
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn failed_delete_leaves_draft_published() {
        let pool = init_test_db().await.unwrap();
        let draft = published_draft(&pool).await;
        let svc = harness(
            pool.clone(),
            Err(AdapterError::Transient {
                platform: "facebook".to_string(),
                message: "timed out".to_string(),
            }),
        );

        let log = svc
            .recover(&draft.id, "duplicate content", Urgency::Immediate, Actor::OperatorWeb)
            .await
            .unwrap();
        assert_eq!(log.status, RecoveryStatus::Failed);

        let reloaded = drafts::get(&pool, &draft.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, DraftStatus::Published);
    }
}
