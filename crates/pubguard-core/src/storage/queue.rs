//! Queue entry persistence (§3 Queue Entry, §4.5).
//!
//! One entry per (draft, platform) pair. Created by the approval service
//! on approval, mutated by the scheduler/executor, read by the recovery
//! service. `update_atomic` mirrors the draft store's pattern: a read,
//! precondition check, and write under one transaction.

use super::util::{new_id, now_rfc3339};
use super::DbPool;
use crate::domain::{Platform, PublishMode, QueueStatus};
use crate::error::StorageError;

/// A scheduled publish intention for one (draft, platform) pair.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueEntry {
    pub id: String,
    pub draft_id: String,
    pub client_id: String,
    pub platform: Platform,
    pub scheduled_at: String,
    pub publish_mode: PublishMode,
    pub status: QueueStatus,
    pub retry_count: i64,
    pub platform_post_id: Option<String>,
    pub platform_post_url: Option<String>,
    pub error_message: Option<String>,
    pub image_ref: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: String,
    draft_id: String,
    client_id: String,
    platform: String,
    scheduled_at: String,
    publish_mode: String,
    status: String,
    retry_count: i64,
    platform_post_id: Option<String>,
    platform_post_url: Option<String>,
    error_message: Option<String>,
    image_ref: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<QueueRow> for QueueEntry {
    type Error = StorageError;

    fn try_from(r: QueueRow) -> Result<Self, StorageError> {
        let corrupt = |field: &str, source: String| StorageError::Query {
            source: sqlx::Error::Decode(format!("queue_entries.{field}: {source}").into()),
        };
        Ok(QueueEntry {
            platform: r.platform.parse().map_err(|e| corrupt("platform", e))?,
            publish_mode: r
                .publish_mode
                .parse()
                .map_err(|e| corrupt("publish_mode", e))?,
            status: r.status.parse().map_err(|e| corrupt("status", e))?,
            id: r.id,
            draft_id: r.draft_id,
            client_id: r.client_id,
            scheduled_at: r.scheduled_at,
            retry_count: r.retry_count,
            platform_post_id: r.platform_post_id,
            platform_post_url: r.platform_post_url,
            error_message: r.error_message,
            image_ref: r.image_ref,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Insert a new queue entry in state `queued`. Called by the approval
/// service when a draft reaches `approved` (Invariant 3).
#[allow(clippy::too_many_arguments)]
pub async fn insert(
    pool: &DbPool,
    draft_id: &str,
    client_id: &str,
    platform: Platform,
    scheduled_at: &str,
    publish_mode: PublishMode,
    image_ref: Option<&str>,
) -> Result<QueueEntry, StorageError> {
    let id = new_id();
    let now = now_rfc3339();

    sqlx::query(
        "INSERT INTO queue_entries (id, draft_id, client_id, platform, scheduled_at, \
         publish_mode, status, retry_count, image_ref, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 'queued', 0, ?, ?, ?)",
    )
    .bind(&id)
    .bind(draft_id)
    .bind(client_id)
    .bind(platform.as_str())
    .bind(scheduled_at)
    .bind(publish_mode.as_str())
    .bind(image_ref)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    get(pool, &id)
        .await?
        .ok_or_else(|| StorageError::Query {
            source: sqlx::Error::RowNotFound,
        })
}

pub async fn get(pool: &DbPool, entry_id: &str) -> Result<Option<QueueEntry>, StorageError> {
    let row = sqlx::query_as::<_, QueueRow>("SELECT * FROM queue_entries WHERE id = ?")
        .bind(entry_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;
    row.map(QueueEntry::try_from).transpose()
}

/// All queue entries for a given draft (one per platform it targets).
pub async fn for_draft(pool: &DbPool, draft_id: &str) -> Result<Vec<QueueEntry>, StorageError> {
    let rows = sqlx::query_as::<_, QueueRow>(
        "SELECT * FROM queue_entries WHERE draft_id = ? ORDER BY created_at ASC",
    )
    .bind(draft_id)
    .fetch_all(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;
    rows.into_iter().map(QueueEntry::try_from).collect()
}

/// Count entries for a (client, platform) pair whose `scheduled_at` falls in
/// `[window_start, window_end)`, restricted to statuses that count toward
/// cadence (queued, publishing, published) -- used by the cadence enforcer.
pub async fn count_in_window(
    pool: &DbPool,
    client_id: &str,
    platform: Platform,
    window_start: &str,
    window_end: &str,
) -> Result<i64, StorageError> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM queue_entries \
         WHERE client_id = ? AND platform = ? AND scheduled_at >= ? AND scheduled_at < ? \
           AND status IN ('queued', 'publishing', 'published')",
    )
    .bind(client_id)
    .bind(platform.as_str())
    .bind(window_start)
    .bind(window_end)
    .fetch_one(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;
    Ok(row.0)
}

/// All queue entries due to fire (`status = 'queued'`), used by the
/// scheduler on startup rehydration.
pub async fn list_queued(pool: &DbPool) -> Result<Vec<QueueEntry>, StorageError> {
    let rows = sqlx::query_as::<_, QueueRow>(
        "SELECT * FROM queue_entries WHERE status = 'queued' ORDER BY scheduled_at ASC",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;
    rows.into_iter().map(QueueEntry::try_from).collect()
}

/// Queue entries with `status = 'published'` more recent than `since`, used
/// to rebuild the rate limiter's in-memory window on restart.
pub async fn list_published_since(
    pool: &DbPool,
    platform: Platform,
    since: &str,
) -> Result<Vec<QueueEntry>, StorageError> {
    let rows = sqlx::query_as::<_, QueueRow>(
        "SELECT * FROM queue_entries WHERE platform = ? AND status = 'published' \
         AND updated_at >= ? ORDER BY updated_at ASC",
    )
    .bind(platform.as_str())
    .bind(since)
    .fetch_all(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;
    rows.into_iter().map(QueueEntry::try_from).collect()
}

/// Outcome of an atomic queue entry update.
pub enum UpdateOutcome<T> {
    Updated(T),
    NotFound,
    PreconditionFailed { actual_status: QueueStatus },
}

/// Read-modify-write a queue entry under a transaction, applying `mutator`
/// only if `expected_status` (when given) matches the current status.
pub async fn update_atomic<F>(
    pool: &DbPool,
    entry_id: &str,
    expected_status: Option<QueueStatus>,
    mutator: F,
) -> Result<UpdateOutcome<QueueEntry>, StorageError>
where
    F: FnOnce(&mut QueueEntry),
{
    let mut tx = pool.begin().await.map_err(|e| StorageError::Query { source: e })?;

    let row = sqlx::query_as::<_, QueueRow>("SELECT * FROM queue_entries WHERE id = ? LIMIT 1")
        .bind(entry_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    let Some(row) = row else {
        tx.rollback().await.ok();
        return Ok(UpdateOutcome::NotFound);
    };

    let mut entry = QueueEntry::try_from(row)?;

    if let Some(expected) = expected_status {
        if entry.status != expected {
            tx.rollback().await.ok();
            return Ok(UpdateOutcome::PreconditionFailed {
                actual_status: entry.status,
            });
        }
    }

    mutator(&mut entry);
    entry.updated_at = now_rfc3339();

    sqlx::query(
        "UPDATE queue_entries SET scheduled_at = ?, status = ?, retry_count = ?, \
         platform_post_id = ?, platform_post_url = ?, error_message = ?, image_ref = ?, \
         updated_at = ? WHERE id = ?",
    )
    .bind(&entry.scheduled_at)
    .bind(entry.status.as_str())
    .bind(entry.retry_count)
    .bind(&entry.platform_post_id)
    .bind(&entry.platform_post_url)
    .bind(&entry.error_message)
    .bind(&entry.image_ref)
    .bind(&entry.updated_at)
    .bind(entry_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    tx.commit().await.map_err(|e| StorageError::Query { source: e })?;

    Ok(UpdateOutcome::Updated(entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let pool = crate::storage::init_test_db().await.unwrap();
        let entry = insert(
            &pool,
            "draft-1",
            "client-1",
            Platform::Facebook,
            "2026-08-01T12:00:00Z",
            PublishMode::Auto,
            None,
        )
        .await
        .unwrap();
        assert_eq!(entry.status, QueueStatus::Queued);

        let fetched = get(&pool, &entry.id).await.unwrap().unwrap();
        assert_eq!(fetched.draft_id, "draft-1");
    }

    #[tokio::test]
    async fn count_in_window_respects_status_filter() {
        let pool = crate::storage::init_test_db().await.unwrap();
        let entry = insert(
            &pool,
            "draft-1",
            "client-1",
            Platform::Facebook,
            "2026-08-01T12:00:00Z",
            PublishMode::Auto,
            None,
        )
        .await
        .unwrap();

        let count = count_in_window(
            &pool,
            "client-1",
            Platform::Facebook,
            "2026-08-01T00:00:00Z",
            "2026-08-02T00:00:00Z",
        )
        .await
        .unwrap();
        assert_eq!(count, 1);

        update_atomic(&pool, &entry.id, Some(QueueStatus::Queued), |e| {
            e.status = QueueStatus::Paused;
        })
        .await
        .unwrap();

        let count_after_pause = count_in_window(
            &pool,
            "client-1",
            Platform::Facebook,
            "2026-08-01T00:00:00Z",
            "2026-08-02T00:00:00Z",
        )
        .await
        .unwrap();
        assert_eq!(count_after_pause, 0);
    }

    #[tokio::test]
    async fn update_atomic_precondition_mismatch() {
        let pool = crate::storage::init_test_db().await.unwrap();
        let entry = insert(
            &pool,
            "draft-1",
            "client-1",
            Platform::Facebook,
            "2026-08-01T12:00:00Z",
            PublishMode::Auto,
            None,
        )
        .await
        .unwrap();

        let outcome = update_atomic(&pool, &entry.id, Some(QueueStatus::Published), |e| {
            e.status = QueueStatus::Failed;
        })
        .await
        .unwrap();

        assert!(matches!(
            outcome,
            UpdateOutcome::PreconditionFailed {
                actual_status: QueueStatus::Queued
            }
        ));
    }
}
