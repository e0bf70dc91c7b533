//! The scheduler's fire-time index (§9 design notes).
//!
//! Lives in its own SQLite file, separate from the main content database.
//! `queue_entries` in the main store remains the source of truth for
//! status; this table exists purely so the scheduler can rehydrate its
//! timer set after a restart without scanning the whole content database.

use super::SchedulerDbPool;
use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SchedulerFire {
    pub entry_id: String,
    pub fire_at: String,
    pub status: String,
}

/// Record (or move) a queue entry's fire time. Upserts on `entry_id`.
pub async fn upsert(
    pool: &SchedulerDbPool,
    entry_id: &str,
    fire_at: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO scheduler_fires (entry_id, fire_at, status) VALUES (?, ?, 'pending') \
         ON CONFLICT(entry_id) DO UPDATE SET fire_at = excluded.fire_at, status = 'pending'",
    )
    .bind(entry_id)
    .bind(fire_at)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;
    Ok(())
}

/// Mark a fire as handled so it won't be picked up again on rehydration.
pub async fn mark_fired(pool: &SchedulerDbPool, entry_id: &str) -> Result<(), StorageError> {
    sqlx::query("UPDATE scheduler_fires SET status = 'fired' WHERE entry_id = ?")
        .bind(entry_id)
        .execute(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;
    Ok(())
}

/// Remove a fire entirely, e.g. when its queue entry is cancelled or paused.
pub async fn remove(pool: &SchedulerDbPool, entry_id: &str) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM scheduler_fires WHERE entry_id = ?")
        .bind(entry_id)
        .execute(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;
    Ok(())
}

/// All fires still pending, oldest first -- used on startup to rebuild the
/// in-process timer set.
pub async fn list_pending(pool: &SchedulerDbPool) -> Result<Vec<SchedulerFire>, StorageError> {
    sqlx::query_as::<_, SchedulerFire>(
        "SELECT entry_id, fire_at, status FROM scheduler_fires WHERE status = 'pending' \
         ORDER BY fire_at ASC",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_list_pending() {
        let pool = crate::storage::init_test_scheduler_db().await.unwrap();
        upsert(&pool, "entry-1", "2026-08-01T12:00:00Z").await.unwrap();
        upsert(&pool, "entry-2", "2026-08-01T13:00:00Z").await.unwrap();

        let pending = list_pending(&pool).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].entry_id, "entry-1");
    }

    #[tokio::test]
    async fn upsert_on_existing_entry_moves_fire_time() {
        let pool = crate::storage::init_test_scheduler_db().await.unwrap();
        upsert(&pool, "entry-1", "2026-08-01T12:00:00Z").await.unwrap();
        upsert(&pool, "entry-1", "2026-08-02T12:00:00Z").await.unwrap();

        let pending = list_pending(&pool).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fire_at, "2026-08-02T12:00:00Z");
    }

    #[tokio::test]
    async fn mark_fired_removes_from_pending_list() {
        let pool = crate::storage::init_test_scheduler_db().await.unwrap();
        upsert(&pool, "entry-1", "2026-08-01T12:00:00Z").await.unwrap();
        mark_fired(&pool, "entry-1").await.unwrap();

        let pending = list_pending(&pool).await.unwrap();
        assert!(pending.is_empty());
    }
}
