//! Chat-bot webhook surface (§6): a single POST endpoint that receives
//! inline-button callbacks and dispatches to the same approval service as
//! the HTTP API. The bot itself (the thing that renders buttons and calls
//! this webhook) is an external edge -- this handler only has to trust the
//! payload shape and route it through `ApprovalService`/`RecoveryService`/
//! `Scheduler`, exactly like `routes::approval` does for the web UI.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use pubguard_core::domain::{Actor, PublishMode, Urgency};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

/// One of the button actions listed in §6: `approve`, `reject`, `edit`,
/// `skip`, `recover`, `pause`, `resume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotAction {
    Approve,
    Reject,
    Edit,
    Skip,
    Recover,
    Pause,
    Resume,
}

/// `POST /api/bot/callback` body: `{action, draft_id, operator_id}` per §6,
/// plus the action-specific fields each wrapper already accepts over HTTP.
/// `operator_id` is accepted but not otherwise used -- every bot-originated
/// mutation is attributed to the single `operator:bot` actor (§3 Audit
/// Record), not to the individual chat user, matching the single-operator
/// assumption in §1.
#[derive(Debug, Deserialize)]
pub struct BotCallback {
    pub action: BotAction,
    pub draft_id: Option<String>,
    #[serde(default)]
    pub operator_id: Option<String>,
    #[serde(default)]
    pub publish_mode: Option<PublishMode>,
    #[serde(default)]
    pub custom_post_time: Option<String>,
    #[serde(default)]
    pub copy: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub guidance: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
}

fn require_draft_id(callback: &BotCallback) -> Result<&str, ApiError> {
    callback
        .draft_id
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("draft_id is required for this action".to_string()))
}

/// `POST /api/bot/callback` -- the webhook the bot's inline-button presses
/// hit. Every branch returns the same JSON shape the HTTP API's equivalent
/// endpoint returns, so the bot front can reuse one response renderer.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BotCallback>,
) -> Result<Json<Value>, ApiError> {
    match body.action {
        BotAction::Approve => {
            let draft_id = require_draft_id(&body)?;
            let publish_mode = body.publish_mode.unwrap_or(PublishMode::Auto);
            let draft = state
                .approval
                .approve(draft_id, Actor::OperatorBot, publish_mode, body.custom_post_time)
                .await?;
            Ok(Json(json!(draft)))
        }
        BotAction::Reject => {
            let draft_id = require_draft_id(&body)?;
            let draft = state
                .approval
                .reject(draft_id, Actor::OperatorBot, body.tags, body.guidance)
                .await?;
            Ok(Json(json!(draft)))
        }
        BotAction::Edit => {
            let draft_id = require_draft_id(&body)?;
            let copy = body
                .copy
                .ok_or_else(|| ApiError::BadRequest("copy is required for the edit action".to_string()))?;
            if copy.trim().is_empty() {
                return Err(ApiError::BadRequest("copy cannot be empty".to_string()));
            }
            let draft = state
                .approval
                .edit(draft_id, Actor::OperatorBot, copy, body.custom_post_time)
                .await?;
            Ok(Json(json!(draft)))
        }
        BotAction::Skip => {
            let draft_id = require_draft_id(&body)?;
            let draft = state.approval.skip(draft_id, Actor::OperatorBot).await?;
            Ok(Json(json!(draft)))
        }
        BotAction::Recover => {
            let draft_id = require_draft_id(&body)?;
            let reason = body.reason.unwrap_or_default();
            let urgency = body.urgency.unwrap_or(Urgency::Review);
            let log = state
                .recovery
                .recover(draft_id, &reason, urgency, Actor::OperatorBot)
                .await?;
            Ok(Json(json!(log)))
        }
        BotAction::Pause => {
            state.scheduler.pause_all(Actor::OperatorBot.as_str()).await?;
            let publish_state = pubguard_core::storage::global_state::get(state.approval.pool()).await?;
            Ok(Json(json!(publish_state)))
        }
        BotAction::Resume => {
            state.scheduler.resume_all().await?;
            let publish_state = pubguard_core::storage::global_state::get(state.approval.pool()).await?;
            Ok(Json(json!(publish_state)))
        }
    }
}
