//! API error types for the pubguard server.
//!
//! Maps core domain errors to HTTP status codes and JSON error responses
//! per the taxonomy in the specification's error handling section:
//! `NotFound` -> 404, `InvalidTransition`/`InvalidState` -> 409,
//! bad input -> 400, oversize upload -> 413, store unavailable -> 500,
//! capacity exhaustion -> 503.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pubguard_core::error::{
    EventBusError, RecoveryError, SchedulerError, StorageError, TransitionError,
};
use serde_json::json;

/// API error type for route handlers.
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    BadRequest(String),
    PayloadTooLarge(String),
    Capacity(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::BadRequest(m)
            | ApiError::PayloadTooLarge(m)
            | ApiError::Capacity(m)
            | ApiError::Internal(m) => m,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "storage error");
        ApiError::Internal(err.to_string())
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            TransitionError::InvalidTransition { .. } | TransitionError::InvalidState { .. } => {
                ApiError::Conflict(err.to_string())
            }
            TransitionError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            TransitionError::StoreUnavailable { .. } | TransitionError::SchedulingFailed { .. } => {
                tracing::error!(error = %err, "transition failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<RecoveryError> for ApiError {
    fn from(err: RecoveryError) -> Self {
        match err {
            RecoveryError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            RecoveryError::InvalidState { .. } => ApiError::Conflict(err.to_string()),
            RecoveryError::StoreUnavailable { .. } => {
                tracing::error!(error = %err, "recovery failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            SchedulerError::NoCadenceSlot { .. } | SchedulerError::ImageMissing { .. } => {
                ApiError::Conflict(err.to_string())
            }
            SchedulerError::StoreUnavailable { .. } | SchedulerError::TransitionFailed { .. } => {
                tracing::error!(error = %err, "scheduler error");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<EventBusError> for ApiError {
    fn from(err: EventBusError) -> Self {
        ApiError::Capacity(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = axum::Json(json!({ "error": self.message() }));
        (status, body).into_response()
    }
}
