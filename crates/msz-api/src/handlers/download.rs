//! Result lookup and the tokenized download itself.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::warn;

use msz_models::{Job, JobId, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub job_id: String,
    pub status: String,
    pub url: String,
}

/// `GET /result/{job_id}` — absolute download URL for a finished job.
pub async fn job_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ResultResponse>> {
    let job_id = JobId::from_string(job_id);
    let job = state
        .registry
        .get(&job_id)
        .ok_or_else(|| ApiError::not_found(format!("job {job_id}")))?;

    match job.status {
        JobStatus::Done => {
            if is_expired(&job, state.config.download_ttl) {
                return Err(ApiError::gone("Download link has expired"));
            }
            let path = job
                .download_url()
                .ok_or_else(|| ApiError::internal("finished job has no download token"))?;
            Ok(Json(ResultResponse {
                job_id: job.id.to_string(),
                status: job.status.as_str().to_string(),
                url: format!("{}{}", state.config.public_base_url, path),
            }))
        }
        JobStatus::Error => Err(ApiError::bad_request("Processing failed")),
        _ => Err(ApiError::bad_request("File not ready")),
    }
}

/// `GET /download/{job_id}/{token}` — serve the compressed file.
pub async fn download(
    State(state): State<AppState>,
    Path((job_id, token)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let job_id = JobId::from_string(job_id);
    let job = state
        .registry
        .get(&job_id)
        .ok_or_else(|| ApiError::not_found("download"))?;

    // A wrong token is indistinguishable from a missing job
    let valid = job.status == JobStatus::Done
        && job.download_token.as_deref() == Some(token.as_str());
    if !valid {
        return Err(ApiError::not_found("download"));
    }
    if is_expired(&job, state.config.download_ttl) {
        return Err(ApiError::gone("Download link has expired"));
    }

    let bytes = tokio::fs::read(&job.output_path).await.map_err(|err| {
        warn!(job_id = %job.id, path = %job.output_path.display(), error = %err, "output file unreadable");
        ApiError::not_found("download")
    })?;

    let disposition = format!("attachment; filename=\"compressed_video_{}.mp4\"", job.id);
    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

fn is_expired(job: &Job, ttl: std::time::Duration) -> bool {
    match job.completed_at {
        Some(completed_at) => {
            let deadline = completed_at + Duration::seconds(ttl.as_secs() as i64);
            Utc::now() > deadline
        }
        None => false,
    }
}
