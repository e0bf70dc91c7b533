//! HTTP/SSE API server for the approval, publishing, and recovery core.
//!
//! Exposes `pubguard-core`'s approval service, recovery service, and
//! scheduler as a REST + SSE API (§6) with local bearer-token auth. This is
//! one of three external edges over the same core -- the others are the bot
//! webhook (routed through this same router) and the CLI (a separate
//! binary).

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the complete axum router with all API routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health::health))
        // Approval queue (§6 HTTP API table)
        .route("/approval/queue", get(routes::approval::list_queue))
        .route("/approval/health-strip", get(routes::approval::health_strip))
        .route("/approval/drafts/{id}/approve", post(routes::approval::approve))
        .route("/approval/drafts/{id}/reject", post(routes::approval::reject))
        .route("/approval/drafts/{id}/edit", post(routes::approval::edit))
        .route("/approval/drafts/{id}/skip", post(routes::approval::skip))
        .route(
            "/approval/drafts/{id}/upload-image",
            post(routes::approval::upload_image),
        )
        .route("/approval/drafts/{id}/recover", post(routes::approval::recover))
        .route("/approval/publishing/pause", post(routes::approval::pause))
        .route("/approval/publishing/resume", post(routes::approval::resume))
        // SSE event stream (§4.2, §6)
        .route("/events", get(routes::events::stream))
        // Chat-bot webhook surface (§6): inline-button callbacks dispatch to
        // the same approval/recovery/scheduler services as the routes above.
        .route("/bot/callback", post(routes::bot::callback))
        // Auth middleware -- applied to every route; health is exempted
        // inside the middleware itself.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
