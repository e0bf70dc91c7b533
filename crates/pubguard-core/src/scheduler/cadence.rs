//! Cadence enforcement (§4.5 cadence enforcer).
//!
//! Given a requested publish time, finds the earliest slot that keeps a
//! (client, platform) pair's posting frequency inside its configured
//! `min_hours_between_posts` gap and `posts_per_week_per_platform` ceiling,
//! then defers further to the platform's own rate-limiter quota. The three
//! constraints are applied in a fixed-point loop: each pass may push the
//! candidate forward, and the loop re-checks all three until nothing moves
//! it, since satisfying one constraint can reintroduce a conflict with
//! another.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::domain::Platform;
use crate::error::SchedulerError;
use crate::rate_limiter::RateLimiter;
use crate::storage::{clients, queue, DbPool};

const SEARCH_HORIZON_DAYS: i64 = 90;
const MAX_ITERATIONS: usize = 200;

/// Resolve the earliest time at or after `requested_at` that satisfies the
/// client's cadence rules and the platform's rate limit.
pub async fn resolve_slot(
    pool: &DbPool,
    rate_limiter: &RateLimiter,
    client_id: &str,
    platform: Platform,
    requested_at: DateTime<Utc>,
) -> Result<DateTime<Utc>, SchedulerError> {
    let cadence = clients::get_cadence(pool, client_id).await?;
    let horizon = requested_at + ChronoDuration::days(SEARCH_HORIZON_DAYS);
    let mut candidate = requested_at.max(rate_limiter.next_available(platform));

    let Some(cadence) = cadence else {
        return Ok(candidate);
    };

    let min_gap = ChronoDuration::hours(cadence.min_hours_between_posts.max(0));
    let weekly_limit = cadence.posts_per_week_per_platform;

    for _ in 0..MAX_ITERATIONS {
        if candidate > horizon {
            return Err(SchedulerError::NoCadenceSlot {
                client_id: client_id.to_string(),
                platform: platform.as_str().to_string(),
                before: horizon.to_rfc3339(),
            });
        }

        let mut advanced = false;

        if min_gap > ChronoDuration::zero() {
            let window_start = (candidate - min_gap).to_rfc3339();
            let window_end = (candidate + min_gap).to_rfc3339();
            let conflicts =
                queue::count_in_window(pool, client_id, platform, &window_start, &window_end).await?;
            if conflicts > 0 {
                candidate += min_gap;
                advanced = true;
            }
        }

        let week_start = (candidate - ChronoDuration::days(7)).to_rfc3339();
        let week_end = (candidate + ChronoDuration::seconds(1)).to_rfc3339();
        let week_count = queue::count_in_window(pool, client_id, platform, &week_start, &week_end).await?;
        if week_count >= i64::from(weekly_limit) {
            candidate += ChronoDuration::days(1);
            advanced = true;
        }

        let next_rate_limit_slot = rate_limiter.next_available(platform);
        if next_rate_limit_slot > candidate {
            candidate = next_rate_limit_slot;
            advanced = true;
        }

        if !advanced {
            return Ok(candidate);
        }
    }

    Err(SchedulerError::NoCadenceSlot {
        client_id: client_id.to_string(),
        platform: platform.as_str().to_string(),
        before: horizon.to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CadenceConfig, RateLimitsConfig};
    use crate::storage::init_test_db;

    async fn seed_cadence(pool: &DbPool, client_id: &str, min_hours: i64, per_week: i64) {
        sqlx::query(
            "INSERT INTO client_cadence (client_id, min_hours_between_posts, \
             posts_per_week_per_platform, preferred_days) VALUES (?, ?, ?, '[]')",
        )
        .bind(client_id)
        .bind(min_hours)
        .bind(per_week)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn no_cadence_row_only_applies_rate_limit() {
        let pool = init_test_db().await.unwrap();
        let limiter = RateLimiter::new(&RateLimitsConfig::default());
        let requested = Utc::now();
        let slot = resolve_slot(&pool, &limiter, "client-1", Platform::Facebook, requested)
            .await
            .unwrap();
        assert_eq!(slot, requested);
    }

    #[tokio::test]
    async fn pushes_past_min_gap_conflict() {
        let pool = init_test_db().await.unwrap();
        seed_cadence(&pool, "client-1", 12, 100).await;
        let limiter = RateLimiter::new(&RateLimitsConfig::default());

        let first_slot = Utc::now();
        queue::insert(
            &pool,
            "draft-1",
            "client-1",
            Platform::Facebook,
            &first_slot.to_rfc3339(),
            crate::domain::PublishMode::Auto,
            None,
        )
        .await
        .unwrap();

        let requested = first_slot + ChronoDuration::hours(2);
        let slot = resolve_slot(&pool, &limiter, "client-1", Platform::Facebook, requested)
            .await
            .unwrap();
        assert!(slot >= first_slot + ChronoDuration::hours(12));
    }

    #[tokio::test]
    async fn exceeding_weekly_cap_pushes_a_day_forward() {
        let pool = init_test_db().await.unwrap();
        seed_cadence(&pool, "client-1", 0, 1).await;
        let limiter = RateLimiter::new(&RateLimitsConfig::default());

        let first_slot = Utc::now();
        queue::insert(
            &pool,
            "draft-1",
            "client-1",
            Platform::Facebook,
            &first_slot.to_rfc3339(),
            crate::domain::PublishMode::Auto,
            None,
        )
        .await
        .unwrap();

        let requested = first_slot + ChronoDuration::hours(1);
        let slot = resolve_slot(&pool, &limiter, "client-1", Platform::Facebook, requested)
            .await
            .unwrap();
        assert!(slot > requested);
    }
}
