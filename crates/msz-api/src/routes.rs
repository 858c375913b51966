//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{checkout, download, health, job_events, job_result, ready, upload_video};
use crate::state::AppState;

// Multipart framing overhead on top of the raw file cap
const UPLOAD_SLACK_BYTES: u64 = 16 * 1024 * 1024;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = (state.config.max_upload_bytes + UPLOAD_SLACK_BYTES) as usize;

    let upload_routes = Router::new()
        .route("/upload", post(upload_video))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(RequestBodyLimitLayer::new(upload_limit));

    let job_routes = Router::new()
        .route("/checkout", post(checkout))
        .route("/events/:job_id", get(job_events))
        .route("/result/:job_id", get(job_result))
        .route("/download/:job_id/:token", get(download));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    Router::new()
        .merge(upload_routes)
        .merge(job_routes)
        .merge(health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
