//! Read access to the append-only audit log (§3 Audit Record).
//!
//! Audit records are written exclusively by `drafts::update_atomic`, inside
//! the same transaction as the status mutation they describe (Invariant 2).
//! This module only exposes read paths -- there is no `insert` here other
//! than the one embedded in that transaction, and no update or delete at
//! all (Invariant 5).

use super::DbPool;
use crate::error::StorageError;

/// A single append-only audit entry.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct AuditRecord {
    pub id: i64,
    pub draft_id: String,
    pub client_id: String,
    pub actor: String,
    pub action: String,
    pub before_snapshot: String,
    pub after_snapshot: String,
    pub created_at: String,
}

/// All audit records for a draft, oldest first (so `target = approved`
/// reliably precedes `target = published` when both exist).
pub async fn for_draft(pool: &DbPool, draft_id: &str) -> Result<Vec<AuditRecord>, StorageError> {
    sqlx::query_as::<_, AuditRecord>(
        "SELECT * FROM audit_log WHERE draft_id = ? ORDER BY id ASC",
    )
    .bind(draft_id)
    .fetch_all(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })
}

/// All audit records for a client within a lookback window, newest first.
pub async fn for_client(
    pool: &DbPool,
    client_id: &str,
    limit: i64,
) -> Result<Vec<AuditRecord>, StorageError> {
    sqlx::query_as::<_, AuditRecord>(
        "SELECT * FROM audit_log WHERE client_id = ? ORDER BY id DESC LIMIT ?",
    )
    .bind(client_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })
}
