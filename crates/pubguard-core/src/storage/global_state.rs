//! Global publish pause state (§3 Global Publish State, §4.5).
//!
//! A single row (enforced by a `CHECK (id = 1)` constraint) recording
//! whether the operator has paused all publishing. The executor consults
//! this before every dispatch attempt; the CLI and bot webhook flip it.

use super::util::now_rfc3339;
use super::DbPool;
use crate::error::StorageError;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct GlobalPublishState {
    pub paused: bool,
    pub paused_by: Option<String>,
    pub paused_at: Option<String>,
}

pub async fn get(pool: &DbPool) -> Result<GlobalPublishState, StorageError> {
    sqlx::query_as::<_, GlobalPublishState>(
        "SELECT paused, paused_by, paused_at FROM global_publish_state WHERE id = 1",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })
}

/// Pause all publishing. Idempotent: pausing an already-paused system just
/// overwrites `paused_by`/`paused_at`.
pub async fn pause(pool: &DbPool, actor: &str) -> Result<GlobalPublishState, StorageError> {
    let now = now_rfc3339();
    sqlx::query(
        "UPDATE global_publish_state SET paused = 1, paused_by = ?, paused_at = ? WHERE id = 1",
    )
    .bind(actor)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;
    get(pool).await
}

/// Resume publishing.
pub async fn resume(pool: &DbPool) -> Result<GlobalPublishState, StorageError> {
    sqlx::query(
        "UPDATE global_publish_state SET paused = 0, paused_by = NULL, paused_at = NULL WHERE id = 1",
    )
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;
    get(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_unpaused() {
        let pool = crate::storage::init_test_db().await.unwrap();
        let state = get(&pool).await.unwrap();
        assert!(!state.paused);
    }

    #[tokio::test]
    async fn pause_then_resume_round_trip() {
        let pool = crate::storage::init_test_db().await.unwrap();
        let paused = pause(&pool, "operator:cli").await.unwrap();
        assert!(paused.paused);
        assert_eq!(paused.paused_by.as_deref(), Some("operator:cli"));

        let resumed = resume(&pool).await.unwrap();
        assert!(!resumed.paused);
        assert!(resumed.paused_by.is_none());
    }
}
