//! Publishing scheduler and executor (C5, §4.5).
//!
//! `Scheduler` is the concrete type behind [`crate::scheduling::SchedulingPort`].
//! Each armed queue entry is one sleeping task: `arm_fire` records the fire
//! time in the scheduler's own database, then spawns a task that sleeps
//! until that instant, takes a permit from the worker-pool semaphore (sized
//! by `scheduler.worker_pool_size`, default 8), and runs the executor
//! algorithm in [`executor`]. There is no separate dispatcher loop -- the
//! sleeping tasks themselves are the timer wheel.
//!
//! `Scheduler` holds a [`std::sync::Weak`] back to itself (built with
//! `Arc::new_cyclic`) so its `&self` methods can hand a fresh `Arc<Scheduler>`
//! to the tasks they spawn.

pub mod cadence;
mod executor;
mod stale;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use crate::adapters::AdapterRegistry;
use crate::approval::ApprovalService;
use crate::config::SchedulerConfig;
use crate::domain::{Platform, PublishMode};
use crate::error::SchedulerError;
use crate::rate_limiter::RateLimiter;
use crate::scheduling::SchedulingPort;
use crate::storage::queue::{self, QueueEntry, UpdateOutcome};
use crate::storage::{global_state, scheduler_store, DbPool, SchedulerDbPool};

/// Owns the publishing queue's fire times, worker pool, and dispatch
/// algorithm. Constructed once at startup and shared (behind an `Arc`) with
/// `ApprovalService` (via [`SchedulingPort`]) and the stale-content monitor.
pub struct Scheduler {
    self_ref: Weak<Scheduler>,
    pool: DbPool,
    scheduler_pool: SchedulerDbPool,
    rate_limiter: Arc<RateLimiter>,
    adapters: Arc<AdapterRegistry>,
    approval: Arc<ApprovalService>,
    config: SchedulerConfig,
    workers: Arc<Semaphore>,
}

impl Scheduler {
    /// Construct a scheduler. Does not rehydrate pending fires or the rate
    /// limiter on its own -- call [`Scheduler::rehydrate`] once after
    /// construction, before attaching to `ApprovalService`.
    pub fn new(
        pool: DbPool,
        scheduler_pool: SchedulerDbPool,
        rate_limiter: Arc<RateLimiter>,
        adapters: Arc<AdapterRegistry>,
        approval: Arc<ApprovalService>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let workers = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
        Arc::new_cyclic(|self_ref| Scheduler {
            self_ref: self_ref.clone(),
            pool,
            scheduler_pool,
            rate_limiter,
            adapters,
            approval,
            config,
            workers,
        })
    }

    /// Rebuild in-memory scheduling state after a restart (§4.5 "Scheduler
    /// durability"): re-arm every fire still recorded as pending, pick up any
    /// queued entry that has no recorded fire (crash between `queue::insert`
    /// and the fire being armed), and rebuild the rate limiter's windows
    /// from recent successful publishes.
    pub async fn rehydrate(&self) -> Result<(), SchedulerError> {
        let pending = scheduler_store::list_pending(&self.scheduler_pool).await?;
        let mut armed: std::collections::HashSet<String> = std::collections::HashSet::new();
        for fire in &pending {
            armed.insert(fire.entry_id.clone());
            if let Ok(fire_at) = DateTime::parse_from_rfc3339(&fire.fire_at) {
                self.spawn_fire_task(fire.entry_id.clone(), fire_at.with_timezone(&Utc));
            }
        }

        for entry in queue::list_queued(&self.pool).await? {
            if armed.contains(&entry.id) {
                continue;
            }
            let fire_at = DateTime::parse_from_rfc3339(&entry.scheduled_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            self.arm_fire(entry.id, fire_at).await?;
        }

        // A generous lookback: `RateLimiter::rebuild` prunes anything outside
        // its own configured window, so over-fetching history is harmless.
        let lookback = (Utc::now() - chrono::Duration::days(30)).to_rfc3339();
        for platform in [Platform::Facebook, Platform::Instagram] {
            let published = queue::list_published_since(&self.pool, platform, &lookback).await?;
            let timestamps = published
                .into_iter()
                .filter_map(|e| DateTime::parse_from_rfc3339(&e.updated_at).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .collect();
            self.rate_limiter.rebuild(platform, timestamps);
        }

        Ok(())
    }

    /// Start the periodic stale-content scan (§4.5 stale monitor). Returns
    /// immediately; the scan runs on its own background task for the life of
    /// the process.
    pub fn start_stale_monitor(self: &Arc<Self>) {
        stale::spawn(self.clone());
    }

    /// Toggle global publish state on (§4.5 `pause_all`). Already-queued
    /// entries keep being scheduled; the executor's dispatch step (4.5 step
    /// 2) is what actually halts.
    pub async fn pause_all(&self, actor: &str) -> Result<(), SchedulerError> {
        global_state::pause(&self.pool, actor).await?;
        Ok(())
    }

    /// Toggle global publish state off (§4.5 `resume_all`).
    pub async fn resume_all(&self) -> Result<(), SchedulerError> {
        global_state::resume(&self.pool).await?;
        Ok(())
    }

    fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Record `entry_id`'s fire time in the scheduler's own database, then
    /// arm the sleeping task that will execute it.
    async fn arm_fire(&self, entry_id: String, fire_at: DateTime<Utc>) -> Result<(), SchedulerError> {
        scheduler_store::upsert(&self.scheduler_pool, &entry_id, &fire_at.to_rfc3339()).await?;
        self.spawn_fire_task(entry_id, fire_at);
        Ok(())
    }

    /// Spawn the task that sleeps until `fire_at`, takes a worker-pool
    /// permit, and runs the executor. Does not touch the scheduler store --
    /// callers that need the fire time persisted should go through
    /// [`Scheduler::arm_fire`] instead.
    fn spawn_fire_task(&self, entry_id: String, fire_at: DateTime<Utc>) {
        let Some(scheduler) = self.self_ref.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let delay = (fire_at - Utc::now()).to_std().unwrap_or(std::time::Duration::ZERO);
            tokio::time::sleep(delay).await;

            let Ok(permit) = scheduler.workers.clone().acquire_owned().await else {
                return;
            };
            if let Err(e) = executor::run(&scheduler, &entry_id).await {
                tracing::error!(entry_id = %entry_id, error = %e, "executor fire failed");
            }
            drop(permit);
        });
    }

    /// Re-arm a fire without touching retry count or entry status (§4.5
    /// executor steps 2 and 3: the global-pause and rate-limit reschedules).
    async fn reschedule_without_retry(
        &self,
        entry: &QueueEntry,
        fire_at: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        self.arm_fire(entry.id.clone(), fire_at).await
    }

    /// Advance (or exhaust) a failed dispatch's retry budget (§4.5 step 8).
    async fn handle_dispatch_failure(&self, entry: &QueueEntry, message: String) -> Result<(), SchedulerError> {
        if entry.retry_count < i64::from(self.config.max_retries) {
            let new_count = entry.retry_count + 1;
            let backoff_secs = self.config.retry_backoff_base_seconds as i64 * 2i64.pow(new_count as u32);
            let fire_at = Utc::now() + chrono::Duration::seconds(backoff_secs);

            let message_for_store = message.clone();
            queue::update_atomic(&self.pool, &entry.id, Some(crate::domain::QueueStatus::Publishing), move |e| {
                e.retry_count = new_count;
                e.status = crate::domain::QueueStatus::Queued;
                e.error_message = Some(message_for_store);
            })
            .await?;

            self.arm_fire(entry.id.clone(), fire_at).await
        } else {
            queue::update_atomic(&self.pool, &entry.id, Some(crate::domain::QueueStatus::Publishing), move |e| {
                e.status = crate::domain::QueueStatus::Failed;
                e.error_message = Some(message.clone());
            })
            .await?;
            scheduler_store::mark_fired(&self.scheduler_pool, &entry.id).await?;

            self.approval.event_bus().publish(crate::events::Event::PublishFailed {
                draft_id: entry.draft_id.clone(),
                client_id: entry.client_id.clone(),
                platform: entry.platform,
                error: "max retries exceeded".to_string(),
            });
            Ok(())
        }
    }

    /// Fail an entry outright without ever dispatching (§4.5 step 4: the
    /// required-image check).
    async fn fail_entry_with_reason(&self, entry: &QueueEntry, reason: &str) -> Result<(), SchedulerError> {
        let reason = reason.to_string();
        let outcome = queue::update_atomic(&self.pool, &entry.id, Some(crate::domain::QueueStatus::Queued), {
            let reason = reason.clone();
            move |e| {
                e.status = crate::domain::QueueStatus::Failed;
                e.error_message = Some(reason);
            }
        })
        .await?;

        if matches!(outcome, UpdateOutcome::Updated(_)) {
            scheduler_store::mark_fired(&self.scheduler_pool, &entry.id).await?;
            self.approval.event_bus().publish(crate::events::Event::PublishFailed {
                draft_id: entry.draft_id.clone(),
                client_id: entry.client_id.clone(),
                platform: entry.platform,
                error: reason,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SchedulingPort for Scheduler {
    async fn schedule(
        &self,
        draft_id: &str,
        client_id: &str,
        platform: Platform,
        requested_at: Option<DateTime<Utc>>,
        publish_mode: PublishMode,
        image_ref: Option<&str>,
    ) -> Result<QueueEntry, SchedulerError> {
        let requested = requested_at.unwrap_or_else(Utc::now);
        let slot = cadence::resolve_slot(&self.pool, &self.rate_limiter, client_id, platform, requested).await?;

        let entry = queue::insert(
            &self.pool,
            draft_id,
            client_id,
            platform,
            &slot.to_rfc3339(),
            publish_mode,
            image_ref,
        )
        .await?;

        self.arm_fire(entry.id.clone(), slot).await?;
        Ok(entry)
    }

    async fn cancel(&self, entry_id: &str) -> Result<(), SchedulerError> {
        let outcome = queue::update_atomic(&self.pool, entry_id, Some(crate::domain::QueueStatus::Queued), |e| {
            e.status = crate::domain::QueueStatus::Paused;
        })
        .await?;

        match outcome {
            UpdateOutcome::Updated(_) => {
                scheduler_store::remove(&self.scheduler_pool, entry_id).await?;
                Ok(())
            }
            UpdateOutcome::NotFound => Err(SchedulerError::NotFound {
                entry_id: entry_id.to_string(),
            }),
            // Already past `queued` (publishing/published/failed/paused) --
            // nothing left to cancel.
            UpdateOutcome::PreconditionFailed { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{PlatformAdapter, PublishOutcome, PublishRequest};
    use crate::config::RateLimitsConfig;
    use crate::domain::{Actor, DraftStatus, QueueStatus};
    use crate::error::AdapterError;
    use crate::events::EventBus;
    use crate::storage::drafts::{self, NewDraft};
    use crate::storage::{init_test_db, init_test_scheduler_db};

    struct ScriptedAdapter {
        platform: Platform,
        results: std::sync::Mutex<Vec<Result<PublishOutcome, AdapterError>>>,
    }

    #[async_trait]
    impl PlatformAdapter for ScriptedAdapter {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn publish(&self, _request: PublishRequest<'_>) -> Result<PublishOutcome, AdapterError> {
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                panic!("adapter called more times than scripted");
            }
            results.remove(0)
        }

        async fn delete(&self, _account_id: &str, _post_id: &str) -> Result<(), AdapterError> {
            unimplemented!("not exercised by scheduler tests")
        }
    }

    fn facebook_always(outcome: Result<PublishOutcome, AdapterError>, times: usize) -> Arc<AdapterRegistry> {
        let facebook = Arc::new(ScriptedAdapter {
            platform: Platform::Facebook,
            results: std::sync::Mutex::new(std::iter::repeat_with(|| outcome.clone()).take(times).collect()),
        });
        let instagram = Arc::new(ScriptedAdapter {
            platform: Platform::Instagram,
            results: std::sync::Mutex::new(vec![]),
        });
        Arc::new(AdapterRegistry::new(facebook, instagram))
    }

    impl Clone for AdapterError {
        fn clone(&self) -> Self {
            match self {
                AdapterError::Transient { platform, message } => AdapterError::Transient {
                    platform: platform.clone(),
                    message: message.clone(),
                },
                AdapterError::Permanent { platform, message } => AdapterError::Permanent {
                    platform: platform.clone(),
                    message: message.clone(),
                },
                AdapterError::Unsupported { platform, operation } => AdapterError::Unsupported {
                    platform: platform.clone(),
                    operation: operation.clone(),
                },
            }
        }
    }

    /// A draft sitting in `in_review`, ready for a test to approve through
    /// `ApprovalService` itself (so the scheduler's `schedule()` runs).
    async fn in_review_draft(pool: &DbPool) -> drafts::Draft {
        let draft = drafts::insert(
            pool,
            NewDraft {
                client_id: "client-1".to_string(),
                platform: Platform::Facebook,
                body: "hello".to_string(),
                image_prompt: None,
                hashtags: vec![],
                image_ref: None,
                suggested_post_time: Some(Utc::now().to_rfc3339()),
                qa_report: None,
                voice_alignment_score: None,
                publish_mode: PublishMode::Auto,
            },
        )
        .await
        .unwrap();
        drafts::update_atomic(pool, &draft.id, Some(DraftStatus::Draft), |d| d.status = DraftStatus::InReview, "sophia:publisher", "intake")
            .await
            .unwrap();
        drafts::get(pool, &draft.id).await.unwrap().unwrap()
    }

    async fn harness(
        adapters: Arc<AdapterRegistry>,
        config: SchedulerConfig,
    ) -> (Arc<Scheduler>, Arc<ApprovalService>, DbPool) {
        let pool = init_test_db().await.unwrap();
        let scheduler_pool = init_test_scheduler_db().await.unwrap();
        let bus = Arc::new(EventBus::new(16, 32));
        let approval = Arc::new(ApprovalService::new(pool.clone(), bus));
        let rate_limiter = Arc::new(RateLimiter::new(&RateLimitsConfig::default()));
        let scheduler = Scheduler::new(pool.clone(), scheduler_pool, rate_limiter, adapters, approval.clone(), config);
        approval.attach_scheduler(scheduler.clone());
        (scheduler, approval, pool)
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            dispatch_timeout_seconds: 5,
            retry_backoff_base_seconds: 60,
            max_retries: 3,
            stale_scan_interval_minutes: 30,
            stale_threshold_hours: 4,
            worker_pool_size: 4,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_dispatch_publishes_draft_and_records_rate_limit() {
        let outcome = Ok(PublishOutcome {
            post_id: "post-1".to_string(),
            post_url: "https://facebook.com/post-1".to_string(),
        });
        let adapters = facebook_always(outcome, 1);
        let (_scheduler, approval, pool) = harness(adapters, fast_config()).await;

        let draft = in_review_draft(&pool).await;
        approval
            .approve(&draft.id, Actor::OperatorWeb, PublishMode::Auto, None)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        let reloaded = drafts::get(&pool, &draft.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, DraftStatus::Published);
        assert_eq!(reloaded.platform_post_id.as_deref(), Some("post-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_retries_exactly_three_times_then_fails() {
        let failing = Err(AdapterError::Transient {
            platform: "facebook".to_string(),
            message: "boom".to_string(),
        });
        let adapters = facebook_always(failing, 4);
        let (_scheduler, approval, pool) = harness(adapters, fast_config()).await;

        let draft = in_review_draft(&pool).await;
        approval
            .approve(&draft.id, Actor::OperatorWeb, PublishMode::Auto, None)
            .await
            .unwrap();

        // advance through the 2/4/8-minute backoff windows
        for _ in 0..4 {
            tokio::time::sleep(std::time::Duration::from_secs(9 * 60)).await;
            tokio::task::yield_now().await;
        }

        let entries = queue::for_draft(&pool, &draft.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, QueueStatus::Failed);
        assert_eq!(entries[0].retry_count, 3);

        let reloaded = drafts::get(&pool, &draft.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, DraftStatus::Approved);
    }

    #[tokio::test(start_paused = true)]
    async fn global_pause_reschedules_without_incrementing_retry() {
        let outcome = Ok(PublishOutcome {
            post_id: "post-1".to_string(),
            post_url: "https://facebook.com/post-1".to_string(),
        });
        let adapters = facebook_always(outcome, 1);
        let (scheduler, approval, pool) = harness(adapters, fast_config()).await;

        scheduler.pause_all("operator:cli").await.unwrap();

        let draft = in_review_draft(&pool).await;
        approval
            .approve(&draft.id, Actor::OperatorWeb, PublishMode::Auto, None)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        let entries = queue::for_draft(&pool, &draft.id).await.unwrap();
        assert_eq!(entries[0].status, QueueStatus::Queued);
        assert_eq!(entries[0].retry_count, 0);

        scheduler.resume_all().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(65)).await;
        tokio::task::yield_now().await;

        let reloaded = drafts::get(&pool, &draft.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, DraftStatus::Published);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_required_image_fails_without_dispatching() {
        let adapters = facebook_always(
            Err(AdapterError::Permanent {
                platform: "instagram".to_string(),
                message: "should not be called".to_string(),
            }),
            0,
        );
        let (_scheduler, approval, pool) = harness(adapters, fast_config()).await;

        let draft = drafts::insert(
            &pool,
            NewDraft {
                client_id: "client-1".to_string(),
                platform: Platform::Instagram,
                body: "hello".to_string(),
                image_prompt: None,
                hashtags: vec![],
                image_ref: None,
                suggested_post_time: Some(Utc::now().to_rfc3339()),
                qa_report: None,
                voice_alignment_score: None,
                publish_mode: PublishMode::Auto,
            },
        )
        .await
        .unwrap();
        drafts::update_atomic(&pool, &draft.id, Some(DraftStatus::Draft), |d| d.status = DraftStatus::InReview, "sophia:publisher", "intake")
            .await
            .unwrap();
        approval
            .approve(&draft.id, Actor::OperatorWeb, PublishMode::Auto, None)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        let entries = queue::for_draft(&pool, &draft.id).await.unwrap();
        assert_eq!(entries[0].status, QueueStatus::Failed);
        assert_eq!(entries[0].error_message.as_deref(), Some("image_missing"));
    }

    #[tokio::test]
    async fn cancel_on_queued_entry_pauses_it() {
        let adapters = facebook_always(
            Err(AdapterError::Permanent {
                platform: "facebook".to_string(),
                message: "n/a".to_string(),
            }),
            0,
        );
        let (scheduler, _approval, pool) = harness(adapters, fast_config()).await;

        let entry = queue::insert(
            &pool,
            "draft-1",
            "client-1",
            Platform::Facebook,
            &(Utc::now() + chrono::Duration::days(1)).to_rfc3339(),
            PublishMode::Auto,
            None,
        )
        .await
        .unwrap();

        scheduler.cancel(&entry.id).await.unwrap();
        let reloaded = queue::get(&pool, &entry.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, QueueStatus::Paused);
    }

    #[tokio::test]
    async fn cancel_on_missing_entry_is_not_found() {
        let adapters = facebook_always(
            Err(AdapterError::Permanent {
                platform: "facebook".to_string(),
                message: "n/a".to_string(),
            }),
            0,
        );
        let (scheduler, _approval, _pool) = harness(adapters, fast_config()).await;
        let err = scheduler.cancel("does-not-exist").await.unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound { .. }));
    }
}
