//! Approval queue endpoints (spec's HTTP API table).

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use chrono::Utc;
use pubguard_core::domain::{Actor, DraftStatus, Platform, PublishMode, Urgency};
use pubguard_core::storage::drafts::DraftFilters;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for `GET /api/approval/queue`.
#[derive(Deserialize, Default)]
pub struct QueueQuery {
    pub client: Option<String>,
    pub status: Option<String>,
    pub platform: Option<String>,
}

/// `GET /api/approval/queue` — list drafts with optional client/status/platform filters.
pub async fn list_queue(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueueQuery>,
) -> Result<Json<Value>, ApiError> {
    let statuses = match params.status {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<DraftStatus>()
                    .map_err(ApiError::BadRequest)
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => vec![],
    };
    let platform = params
        .platform
        .map(|p| p.parse::<Platform>().map_err(ApiError::BadRequest))
        .transpose()?;

    let filters = DraftFilters {
        statuses,
        client_id: params.client,
        platform,
    };

    let drafts = pubguard_core::storage::drafts::list(state.approval.pool(), &filters).await?;
    Ok(Json(json!(drafts)))
}

/// `GET /api/approval/health-strip` — counts per draft status.
pub async fn health_strip(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let all = pubguard_core::storage::drafts::list(state.approval.pool(), &DraftFilters::default()).await?;

    let mut counts = serde_json::Map::new();
    for status in [
        DraftStatus::Draft,
        DraftStatus::InReview,
        DraftStatus::Approved,
        DraftStatus::Rejected,
        DraftStatus::Skipped,
        DraftStatus::Published,
        DraftStatus::Recovered,
    ] {
        let count = all.iter().filter(|d| d.status == status).count();
        counts.insert(status.as_str().to_string(), json!(count));
    }

    Ok(Json(Value::Object(counts)))
}

#[derive(Deserialize)]
pub struct ApproveRequest {
    pub publish_mode: PublishMode,
    pub custom_post_time: Option<String>,
}

/// `POST /api/approval/drafts/{id}/approve`.
pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<Value>, ApiError> {
    let draft = state
        .approval
        .approve(&id, Actor::OperatorWeb, body.publish_mode, body.custom_post_time)
        .await?;
    Ok(Json(json!(draft)))
}

#[derive(Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub tags: Vec<String>,
    pub guidance: Option<String>,
}

/// `POST /api/approval/drafts/{id}/reject`.
pub async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RejectRequest>,
) -> Result<Json<Value>, ApiError> {
    let draft = state
        .approval
        .reject(&id, Actor::OperatorWeb, body.tags, body.guidance)
        .await?;
    Ok(Json(json!(draft)))
}

#[derive(Deserialize)]
pub struct EditRequest {
    pub copy: String,
    pub custom_post_time: Option<String>,
}

/// `POST /api/approval/drafts/{id}/edit`.
pub async fn edit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<EditRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.copy.trim().is_empty() {
        return Err(ApiError::BadRequest("copy cannot be empty".to_string()));
    }
    let draft = state
        .approval
        .edit(&id, Actor::OperatorWeb, body.copy, body.custom_post_time)
        .await?;
    Ok(Json(json!(draft)))
}

/// `POST /api/approval/drafts/{id}/skip`.
pub async fn skip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let draft = state.approval.skip(&id, Actor::OperatorWeb).await?;
    Ok(Json(json!(draft)))
}

const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// `POST /api/approval/drafts/{id}/upload-image` — multipart upload; writes
/// the first `image` field to the media directory and sets the draft's
/// `image_ref` to the resulting path. Not a status transition, so this goes
/// straight through the draft store rather than `ApprovalService`.
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let draft = pubguard_core::storage::drafts::get(state.approval.pool(), &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("draft {id} not found")))?;

    let mut saved_path: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let extension = field
            .file_name()
            .and_then(|name| name.rsplit('.').next())
            .filter(|ext| ext.len() <= 5)
            .unwrap_or("bin")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ApiError::PayloadTooLarge(format!(
                "image exceeds the {MAX_IMAGE_BYTES}-byte limit"
            )));
        }

        std::fs::create_dir_all(&state.media_dir)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let filename = format!("{id}-{}.{extension}", Utc::now().timestamp_millis());
        let path = state.media_dir.join(&filename);
        std::fs::write(&path, &bytes).map_err(|e| ApiError::Internal(e.to_string()))?;
        saved_path = Some(path.to_string_lossy().into_owned());
        break;
    }

    let Some(image_ref) = saved_path else {
        return Err(ApiError::BadRequest(
            "multipart body must include an `image` field".to_string(),
        ));
    };

    let outcome = pubguard_core::storage::drafts::update_atomic(
        state.approval.pool(),
        &draft.id,
        None,
        move |d| d.image_ref = Some(image_ref),
        Actor::OperatorWeb.as_str(),
        "upload_image",
    )
    .await?;

    match outcome {
        pubguard_core::storage::drafts::UpdateOutcome::Updated(draft) => Ok(Json(json!(draft))),
        pubguard_core::storage::drafts::UpdateOutcome::NotFound => {
            Err(ApiError::NotFound(format!("draft {id} not found")))
        }
        pubguard_core::storage::drafts::UpdateOutcome::PreconditionFailed { .. } => {
            Err(ApiError::Conflict(format!("draft {id} was concurrently modified")))
        }
    }
}

#[derive(Deserialize)]
pub struct RecoverRequest {
    pub reason: String,
    pub urgency: Urgency,
}

/// `POST /api/approval/drafts/{id}/recover`.
pub async fn recover(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RecoverRequest>,
) -> Result<Json<Value>, ApiError> {
    let log = state
        .recovery
        .recover(&id, &body.reason, body.urgency, Actor::OperatorWeb)
        .await?;
    Ok(Json(json!(log)))
}

/// `POST /api/approval/publishing/pause`.
pub async fn pause(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state.scheduler.pause_all(Actor::OperatorWeb.as_str()).await?;
    let publish_state = pubguard_core::storage::global_state::get(state.approval.pool()).await?;
    Ok(Json(json!(publish_state)))
}

/// `POST /api/approval/publishing/resume`.
pub async fn resume(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state.scheduler.resume_all().await?;
    let publish_state = pubguard_core::storage::global_state::get(state.approval.pool()).await?;
    Ok(Json(json!(publish_state)))
}
