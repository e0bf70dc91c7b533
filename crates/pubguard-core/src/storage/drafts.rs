//! Draft persistence (§4.1, §3 Draft).
//!
//! `update_atomic` is the single mutation entry point: callers supply a
//! precondition (the status they expect to find) and a mutator closure.
//! The row is locked, read, checked, mutated, and written back inside one
//! transaction, alongside its audit record -- there is no direct "set
//! status" entry point here; only the approval service (C3) is expected to
//! call this.

use serde::{Deserialize, Serialize};

use super::util::{new_id, now_rfc3339};
use super::DbPool;
use crate::domain::{DraftStatus, Platform, PublishMode};
use crate::error::StorageError;

/// A single edit made by an operator, recorded for the edit history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditEntry {
    pub at: String,
    pub actor: String,
    pub previous_body: String,
}

/// The central unit of work (§3 Draft).
#[derive(Debug, Clone, Serialize)]
pub struct Draft {
    pub id: String,
    pub client_id: String,
    pub platform: Platform,
    pub body: String,
    pub image_prompt: Option<String>,
    pub hashtags: Vec<String>,
    pub image_ref: Option<String>,
    pub suggested_post_time: Option<String>,
    pub custom_post_time: Option<String>,
    pub qa_report: Option<serde_json::Value>,
    pub voice_alignment_score: Option<f64>,
    pub status: DraftStatus,
    pub publish_mode: PublishMode,
    pub approved_at: Option<String>,
    pub approved_by: Option<String>,
    pub platform_post_id: Option<String>,
    pub platform_post_url: Option<String>,
    pub edit_history: Vec<EditEntry>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(sqlx::FromRow)]
struct DraftRow {
    id: String,
    client_id: String,
    platform: String,
    body: String,
    image_prompt: Option<String>,
    hashtags: Option<String>,
    image_ref: Option<String>,
    suggested_post_time: Option<String>,
    custom_post_time: Option<String>,
    qa_report: Option<String>,
    voice_alignment_score: Option<f64>,
    status: String,
    publish_mode: String,
    approved_at: Option<String>,
    approved_by: Option<String>,
    platform_post_id: Option<String>,
    platform_post_url: Option<String>,
    edit_history: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<DraftRow> for Draft {
    type Error = StorageError;

    fn try_from(r: DraftRow) -> Result<Self, StorageError> {
        let corrupt = |field: &str, source: String| StorageError::Query {
            source: sqlx::Error::Decode(format!("drafts.{field}: {source}").into()),
        };

        Ok(Draft {
            platform: r.platform.parse().map_err(|e| corrupt("platform", e))?,
            status: r.status.parse().map_err(|e| corrupt("status", e))?,
            publish_mode: r
                .publish_mode
                .parse()
                .map_err(|e| corrupt("publish_mode", e))?,
            hashtags: r
                .hashtags
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| corrupt("hashtags", e.to_string()))?
                .unwrap_or_default(),
            qa_report: r
                .qa_report
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| corrupt("qa_report", e.to_string()))?,
            edit_history: serde_json::from_str(&r.edit_history)
                .map_err(|e| corrupt("edit_history", e.to_string()))?,
            id: r.id,
            client_id: r.client_id,
            body: r.body,
            image_prompt: r.image_prompt,
            image_ref: r.image_ref,
            suggested_post_time: r.suggested_post_time,
            custom_post_time: r.custom_post_time,
            voice_alignment_score: r.voice_alignment_score,
            approved_at: r.approved_at,
            approved_by: r.approved_by,
            platform_post_id: r.platform_post_id,
            platform_post_url: r.platform_post_url,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Fields an intake call (generation pipeline) supplies when inserting a
/// brand-new draft in state `draft`.
pub struct NewDraft {
    pub client_id: String,
    pub platform: Platform,
    pub body: String,
    pub image_prompt: Option<String>,
    pub hashtags: Vec<String>,
    pub image_ref: Option<String>,
    pub suggested_post_time: Option<String>,
    pub qa_report: Option<serde_json::Value>,
    pub voice_alignment_score: Option<f64>,
    pub publish_mode: PublishMode,
}

/// Insert a brand-new draft in state `draft`. Called by the external
/// generation pipeline, never by C3 directly.
pub async fn insert(pool: &DbPool, new: NewDraft) -> Result<Draft, StorageError> {
    let id = new_id();
    let now = now_rfc3339();
    let hashtags_json = serde_json::to_string(&new.hashtags).unwrap_or_else(|_| "[]".to_string());
    let qa_json = new
        .qa_report
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default();

    sqlx::query(
        "INSERT INTO drafts (id, client_id, platform, body, image_prompt, hashtags, image_ref, \
         suggested_post_time, qa_report, voice_alignment_score, status, publish_mode, \
         edit_history, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'draft', ?, '[]', ?, ?)",
    )
    .bind(&id)
    .bind(&new.client_id)
    .bind(new.platform.as_str())
    .bind(&new.body)
    .bind(&new.image_prompt)
    .bind(&hashtags_json)
    .bind(&new.image_ref)
    .bind(&new.suggested_post_time)
    .bind(if qa_json.is_empty() { None } else { Some(qa_json) })
    .bind(new.voice_alignment_score)
    .bind(new.publish_mode.as_str())
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

/// Fetch a single draft by id.
pub async fn get(pool: &DbPool, draft_id: &str) -> Result<Option<Draft>, StorageError> {
    let row = sqlx::query_as::<_, DraftRow>("SELECT * FROM drafts WHERE id = ?")
        .bind(draft_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    row.map(Draft::try_from).transpose()
}

/// Filters accepted by `list_queue` (the operator-facing approval queue
/// listing, §4.1).
#[derive(Debug, Clone, Default)]
pub struct DraftFilters {
    pub statuses: Vec<DraftStatus>,
    pub client_id: Option<String>,
    pub platform: Option<Platform>,
}

/// List drafts matching the given filters, most recently updated first.
pub async fn list(pool: &DbPool, filters: &DraftFilters) -> Result<Vec<Draft>, StorageError> {
    let mut sql = String::from("SELECT * FROM drafts WHERE 1=1");
    if !filters.statuses.is_empty() {
        let placeholders = filters
            .statuses
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(",");
        sql.push_str(&format!(" AND status IN ({placeholders})"));
    }
    if filters.client_id.is_some() {
        sql.push_str(" AND client_id = ?");
    }
    if filters.platform.is_some() {
        sql.push_str(" AND platform = ?");
    }
    sql.push_str(" ORDER BY updated_at DESC");

    let mut query = sqlx::query_as::<_, DraftRow>(&sql);
    for s in &filters.statuses {
        query = query.bind(s.as_str());
    }
    if let Some(c) = &filters.client_id {
        query = query.bind(c);
    }
    if let Some(p) = filters.platform {
        query = query.bind(p.as_str());
    }

    let rows = query
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    rows.into_iter().map(Draft::try_from).collect()
}

/// Outcome of an atomic update attempt.
pub enum UpdateOutcome<T> {
    Updated(T),
    NotFound,
    PreconditionFailed { actual_status: DraftStatus },
}

/// Read-modify-write a draft under a single transaction, applying `mutator`
/// only if `expected_status` matches the row's current status. The audit
/// write described by `after_audit` (label, actor, before/after snapshot
/// strings) happens in the same transaction -- the store never exposes a
/// status mutation without its audit record (Invariant 2, §3).
///
/// `mutator` receives `&mut Draft` and may also update `updated_at`,
/// `approved_at`, etc.; the caller (C3) is responsible for all field-level
/// semantics. This function only owns the transactional read/compare/write.
pub async fn update_atomic<F>(
    pool: &DbPool,
    draft_id: &str,
    expected_status: Option<DraftStatus>,
    mutator: F,
    actor: &str,
    action: &str,
) -> Result<UpdateOutcome<Draft>, StorageError>
where
    F: FnOnce(&mut Draft),
{
    let mut tx = pool.begin().await.map_err(|e| StorageError::Query { source: e })?;

    let row = sqlx::query_as::<_, DraftRow>("SELECT * FROM drafts WHERE id = ? LIMIT 1")
        .bind(draft_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    let Some(row) = row else {
        tx.rollback().await.ok();
        return Ok(UpdateOutcome::NotFound);
    };

    let before = Draft::try_from(row)?;

    if let Some(expected) = expected_status {
        if before.status != expected {
            tx.rollback().await.ok();
            return Ok(UpdateOutcome::PreconditionFailed {
                actual_status: before.status,
            });
        }
    }

    let before_snapshot = serde_json::to_string(&before).unwrap_or_default();

    let mut after = before.clone_for_mutation();
    mutator(&mut after);
    after.updated_at = now_rfc3339();

    let after_snapshot = serde_json::to_string(&after).unwrap_or_default();
    let hashtags_json = serde_json::to_string(&after.hashtags).unwrap_or_else(|_| "[]".to_string());
    let qa_json = after.qa_report.as_ref().map(std::string::ToString::to_string);
    let edit_history_json =
        serde_json::to_string(&after.edit_history).unwrap_or_else(|_| "[]".to_string());

    sqlx::query(
        "UPDATE drafts SET body = ?, image_prompt = ?, hashtags = ?, image_ref = ?, \
         suggested_post_time = ?, custom_post_time = ?, qa_report = ?, voice_alignment_score = ?, \
         status = ?, publish_mode = ?, approved_at = ?, approved_by = ?, platform_post_id = ?, \
         platform_post_url = ?, edit_history = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&after.body)
    .bind(&after.image_prompt)
    .bind(&hashtags_json)
    .bind(&after.image_ref)
    .bind(&after.suggested_post_time)
    .bind(&after.custom_post_time)
    .bind(&qa_json)
    .bind(after.voice_alignment_score)
    .bind(after.status.as_str())
    .bind(after.publish_mode.as_str())
    .bind(&after.approved_at)
    .bind(&after.approved_by)
    .bind(&after.platform_post_id)
    .bind(&after.platform_post_url)
    .bind(&edit_history_json)
    .bind(&after.updated_at)
    .bind(draft_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    sqlx::query(
        "INSERT INTO audit_log (draft_id, client_id, actor, action, before_snapshot, \
         after_snapshot, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(draft_id)
    .bind(&after.client_id)
    .bind(actor)
    .bind(action)
    .bind(&before_snapshot)
    .bind(&after_snapshot)
    .bind(now_rfc3339())
    .execute(&mut *tx)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    tx.commit().await.map_err(|e| StorageError::Query { source: e })?;

    Ok(UpdateOutcome::Updated(after))
}

impl Draft {
    /// Clone used as the mutation starting point inside `update_atomic`.
    /// A plain `Clone` derive would also work; this name documents intent
    /// at the call site.
    fn clone_for_mutation(&self) -> Draft {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    fn sample_new_draft() -> NewDraft {
        NewDraft {
            client_id: "client-1".to_string(),
            platform: Platform::Facebook,
            body: "hello world".to_string(),
            image_prompt: None,
            hashtags: vec!["#a".to_string()],
            image_ref: None,
            suggested_post_time: Some("2026-08-01T12:00:00Z".to_string()),
            qa_report: Some(serde_json::json!({"score": 90})),
            voice_alignment_score: Some(0.9),
            publish_mode: PublishMode::Auto,
        }
    }

    #[tokio::test]
    async fn insert_and_get_round_trips() {
        let pool = init_test_db().await.unwrap();
        let draft = insert(&pool, sample_new_draft()).await.unwrap();
        assert_eq!(draft.status, DraftStatus::Draft);

        let fetched = get(&pool, &draft.id).await.unwrap().unwrap();
        assert_eq!(fetched.body, "hello world");
        assert_eq!(fetched.hashtags, vec!["#a".to_string()]);
    }

    #[tokio::test]
    async fn update_atomic_respects_precondition() {
        let pool = init_test_db().await.unwrap();
        let draft = insert(&pool, sample_new_draft()).await.unwrap();

        let outcome = update_atomic(
            &pool,
            &draft.id,
            Some(DraftStatus::InReview),
            |d| d.status = DraftStatus::Approved,
            "operator:web",
            "approve",
        )
        .await
        .unwrap();

        assert!(matches!(
            outcome,
            UpdateOutcome::PreconditionFailed {
                actual_status: DraftStatus::Draft
            }
        ));
    }

    #[tokio::test]
    async fn update_atomic_writes_audit_record() {
        let pool = init_test_db().await.unwrap();
        let draft = insert(&pool, sample_new_draft()).await.unwrap();

        let outcome = update_atomic(
            &pool,
            &draft.id,
            Some(DraftStatus::Draft),
            |d| d.status = DraftStatus::InReview,
            "sophia:publisher",
            "intake",
        )
        .await
        .unwrap();

        assert!(matches!(outcome, UpdateOutcome::Updated(_)));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_log WHERE draft_id = ?")
            .bind(&draft.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn not_found_for_missing_draft() {
        let pool = init_test_db().await.unwrap();
        let outcome = update_atomic(
            &pool,
            "does-not-exist",
            None,
            |_| {},
            "operator:web",
            "noop",
        )
        .await
        .unwrap();
        assert!(matches!(outcome, UpdateOutcome::NotFound));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let pool = init_test_db().await.unwrap();
        let d1 = insert(&pool, sample_new_draft()).await.unwrap();
        let mut d2_new = sample_new_draft();
        d2_new.client_id = "client-2".to_string();
        let d2 = insert(&pool, d2_new).await.unwrap();

        update_atomic(
            &pool,
            &d2.id,
            Some(DraftStatus::Draft),
            |d| d.status = DraftStatus::InReview,
            "sophia:publisher",
            "intake",
        )
        .await
        .unwrap();

        let in_review = list(
            &pool,
            &DraftFilters {
                statuses: vec![DraftStatus::InReview],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(in_review.len(), 1);
        assert_eq!(in_review[0].id, d2.id);

        let all_drafts = list(
            &pool,
            &DraftFilters {
                statuses: vec![DraftStatus::Draft],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(all_drafts.len(), 1);
        assert_eq!(all_drafts[0].id, d1.id);
    }
}
