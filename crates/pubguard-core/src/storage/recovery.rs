//! Recovery log persistence (§3 Recovery Log, §4.6).
//!
//! Each row records one recovery attempt against a published draft. Created
//! in `pending` by the recovery service, then moved to a terminal status
//! (`completed`, `failed`, `manual_recovery_needed`) once the adapter call
//! resolves. Never mutated after that -- a second recovery attempt on the
//! same draft gets its own row.

use super::util::{new_id, now_rfc3339};
use super::DbPool;
use crate::domain::{Platform, RecoveryStatus, Urgency};
use crate::error::StorageError;

#[derive(Debug, Clone, serde::Serialize)]
pub struct RecoveryLog {
    pub id: String,
    pub draft_id: String,
    pub client_id: String,
    pub platform: Platform,
    pub platform_post_id: String,
    pub urgency: Urgency,
    pub reason: String,
    pub status: RecoveryStatus,
    pub actor: String,
    pub completed_at: Option<String>,
    pub replacement_draft_id: Option<String>,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct RecoveryRow {
    id: String,
    draft_id: String,
    client_id: String,
    platform: String,
    platform_post_id: String,
    urgency: String,
    reason: String,
    status: String,
    actor: String,
    completed_at: Option<String>,
    replacement_draft_id: Option<String>,
    created_at: String,
}

impl TryFrom<RecoveryRow> for RecoveryLog {
    type Error = StorageError;

    fn try_from(r: RecoveryRow) -> Result<Self, StorageError> {
        let corrupt = |field: &str, source: String| StorageError::Query {
            source: sqlx::Error::Decode(format!("recovery_log.{field}: {source}").into()),
        };
        Ok(RecoveryLog {
            platform: r.platform.parse().map_err(|e| corrupt("platform", e))?,
            urgency: r.urgency.parse().map_err(|e| corrupt("urgency", e))?,
            status: r.status.parse().map_err(|e| corrupt("status", e))?,
            id: r.id,
            draft_id: r.draft_id,
            client_id: r.client_id,
            platform_post_id: r.platform_post_id,
            reason: r.reason,
            actor: r.actor,
            completed_at: r.completed_at,
            replacement_draft_id: r.replacement_draft_id,
            created_at: r.created_at,
        })
    }
}

/// Create a new recovery attempt in `pending`.
#[allow(clippy::too_many_arguments)]
pub async fn insert(
    pool: &DbPool,
    draft_id: &str,
    client_id: &str,
    platform: Platform,
    platform_post_id: &str,
    urgency: Urgency,
    reason: &str,
    actor: &str,
) -> Result<RecoveryLog, StorageError> {
    let id = new_id();
    let now = now_rfc3339();

    sqlx::query(
        "INSERT INTO recovery_log (id, draft_id, client_id, platform, platform_post_id, \
         urgency, reason, status, actor, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)",
    )
    .bind(&id)
    .bind(draft_id)
    .bind(client_id)
    .bind(platform.as_str())
    .bind(platform_post_id)
    .bind(urgency.as_str())
    .bind(reason)
    .bind(actor)
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

pub async fn get(pool: &DbPool, recovery_id: &str) -> Result<Option<RecoveryLog>, StorageError> {
    let row = sqlx::query_as::<_, RecoveryRow>("SELECT * FROM recovery_log WHERE id = ?")
        .bind(recovery_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;
    row.map(RecoveryLog::try_from).transpose()
}

pub async fn for_draft(pool: &DbPool, draft_id: &str) -> Result<Vec<RecoveryLog>, StorageError> {
    let rows = sqlx::query_as::<_, RecoveryRow>(
        "SELECT * FROM recovery_log WHERE draft_id = ? ORDER BY created_at ASC",
    )
    .bind(draft_id)
    .fetch_all(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;
    rows.into_iter().map(RecoveryLog::try_from).collect()
}

/// Move a `pending`/`executing` attempt to a terminal status. Never
/// overwrites an already-terminal row; callers create a fresh attempt for a
/// second try instead.
pub async fn complete(
    pool: &DbPool,
    recovery_id: &str,
    status: RecoveryStatus,
    replacement_draft_id: Option<&str>,
) -> Result<Option<RecoveryLog>, StorageError> {
    let now = now_rfc3339();
    let result = sqlx::query(
        "UPDATE recovery_log SET status = ?, completed_at = ?, replacement_draft_id = ? \
         WHERE id = ? AND status IN ('pending', 'executing')",
    )
    .bind(status.as_str())
    .bind(&now)
    .bind(replacement_draft_id)
    .bind(recovery_id)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get(pool, recovery_id).await
}

/// Record that a replacement draft has been linked to a completed recovery
/// attempt. Unlike `complete`, this does not require a terminal-status
/// transition -- it only attaches metadata to a row that is already
/// `completed`.
pub async fn set_replacement(
    pool: &DbPool,
    recovery_id: &str,
    replacement_draft_id: &str,
) -> Result<Option<RecoveryLog>, StorageError> {
    let result = sqlx::query(
        "UPDATE recovery_log SET replacement_draft_id = ? WHERE id = ? AND status = 'completed'",
    )
    .bind(replacement_draft_id)
    .bind(recovery_id)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get(pool, recovery_id).await
}

/// Most recent recovery attempt for a draft, if any.
pub async fn latest_for_draft(
    pool: &DbPool,
    draft_id: &str,
) -> Result<Option<RecoveryLog>, StorageError> {
    let row = sqlx::query_as::<_, RecoveryRow>(
        "SELECT * FROM recovery_log WHERE draft_id = ? ORDER BY created_at DESC LIMIT 1",
    )
    .bind(draft_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;
    row.map(RecoveryLog::try_from).transpose()
}

/// Mark an attempt `executing`, the transient state while the adapter call
/// to delete the live post is in flight.
pub async fn mark_executing(pool: &DbPool, recovery_id: &str) -> Result<(), StorageError> {
    sqlx::query("UPDATE recovery_log SET status = 'executing' WHERE id = ? AND status = 'pending'")
        .bind(recovery_id)
        .execute(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_complete_round_trip() {
        let pool = crate::storage::init_test_db().await.unwrap();
        let log = insert(
            &pool,
            "draft-1",
            "client-1",
            Platform::Facebook,
            "post-123",
            Urgency::Immediate,
            "duplicate content detected",
            "operator:web",
        )
        .await
        .unwrap();
        assert_eq!(log.status, RecoveryStatus::Pending);

        mark_executing(&pool, &log.id).await.unwrap();
        let completed = complete(&pool, &log.id, RecoveryStatus::Completed, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.status, RecoveryStatus::Completed);
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn complete_is_noop_on_already_terminal_row() {
        let pool = crate::storage::init_test_db().await.unwrap();
        let log = insert(
            &pool,
            "draft-1",
            "client-1",
            Platform::Facebook,
            "post-123",
            Urgency::Review,
            "stale content",
            "sophia:monitor",
        )
        .await
        .unwrap();

        complete(&pool, &log.id, RecoveryStatus::Failed, None)
            .await
            .unwrap();
        let second = complete(&pool, &log.id, RecoveryStatus::Completed, None)
            .await
            .unwrap();
        assert!(second.is_none());

        let fetched = get(&pool, &log.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RecoveryStatus::Failed);
    }
}
