//! Health check handlers.

use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub ffmpeg: bool,
    pub ffprobe: bool,
}

/// Readiness check endpoint. Not ready until both encoder binaries resolve.
pub async fn ready() -> (StatusCode, Json<ReadinessResponse>) {
    let ffmpeg = msz_media::check_ffmpeg().is_ok();
    let ffprobe = msz_media::check_ffprobe().is_ok();
    let all_ok = ffmpeg && ffprobe;

    let status_code = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status_code,
        Json(ReadinessResponse {
            status: if all_ok { "ready" } else { "not_ready" }.to_string(),
            ffmpeg,
            ffprobe,
        }),
    )
}
