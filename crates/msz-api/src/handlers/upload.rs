//! Upload receiver: stream the file to disk, probe it, price it.

use std::path::{Path, PathBuf};
use std::pin::pin;

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::Json;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use msz_models::Provider;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Upload extensions the encoder accepts.
const ALLOWED_EXTENSIONS: [&str; 4] = [".mp4", ".mov", ".mkv", ".avi"];

/// Ceiling on the probed duration, seconds.
const MAX_DURATION_SEC: u32 = 1200;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: String,
    pub size_bytes: u64,
    pub duration_sec: u32,
    pub tier: u8,
    pub price: f64,
    pub target_size_mb: u64,
}

/// `POST /upload` — multipart with a `file` part and a `provider` part.
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut provider: Option<Provider> = None;
    let mut saved: Option<(PathBuf, u64, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("malformed multipart body: {err}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("provider") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| ApiError::bad_request(format!("unreadable provider field: {err}")))?;
                provider = Some(
                    text.trim()
                        .parse::<Provider>()
                        .map_err(ApiError::BadRequest)?,
                );
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let ext = file_extension(&filename)?;

                let stem = Uuid::new_v4().simple().to_string();
                let path = state.config.upload_dir.join(format!("upload_{stem}{ext}"));
                let total = stream_to_disk(field, &path, state.config.max_upload_bytes).await?;
                saved = Some((path, total, stem));
            }
            _ => {}
        }
    }

    let Some((source_path, size_bytes, stem)) = saved else {
        return Err(ApiError::bad_request("missing file field"));
    };
    let Some(provider) = provider else {
        discard(&source_path).await;
        return Err(ApiError::bad_request("missing provider field"));
    };

    // Probe before pricing; a file ffprobe cannot read is not a video
    let info = match msz_media::probe_video(&source_path).await {
        Ok(info) => info,
        Err(err) => {
            warn!(path = %source_path.display(), error = %err, "probe failed");
            discard(&source_path).await;
            return Err(ApiError::bad_request("could not read video metadata"));
        }
    };
    let duration_sec = info.duration.round() as u32;
    if duration_sec == 0 {
        discard(&source_path).await;
        return Err(ApiError::bad_request("video has no duration"));
    }
    if duration_sec > MAX_DURATION_SEC {
        discard(&source_path).await;
        return Err(ApiError::bad_request("Video exceeds 20 minute limit"));
    }

    let output_path = state.config.upload_dir.join(format!("compressed_{stem}.mp4"));
    let ticket = match state
        .registry
        .create(&source_path, &output_path, size_bytes, duration_sec, provider)
    {
        Ok(ticket) => ticket,
        Err(err) => {
            discard(&source_path).await;
            return Err(err.into());
        }
    };

    debug!(job_id = %ticket.job_id, size_bytes, duration_sec, "upload accepted");
    Ok(Json(UploadResponse {
        job_id: ticket.job_id.to_string(),
        size_bytes: ticket.size_bytes,
        duration_sec: ticket.duration_sec,
        tier: ticket.tier,
        price: ticket.price,
        target_size_mb: ticket.target_size_mb,
    }))
}

/// Validate and return the lowercase extension including its dot.
fn file_extension(filename: &str) -> ApiResult<String> {
    let ext = Path::new(filename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(ApiError::bad_request(format!(
            "Unsupported file type: {}",
            if ext.is_empty() { "(none)" } else { &ext }
        )))
    }
}

/// Stream body chunks to disk, enforcing the byte cap mid-stream. Any
/// rejection deletes the partial file before returning.
async fn stream_to_disk<S, E>(body: S, path: &Path, max_bytes: u64) -> ApiResult<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut out = tokio::fs::File::create(path)
        .await
        .map_err(|err| ApiError::internal(format!("could not create upload file: {err}")))?;
    let mut total: u64 = 0;
    let mut body = pin!(body);

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                discard(path).await;
                return Err(ApiError::bad_request(format!("upload interrupted: {err}")));
            }
        };
        total += chunk.len() as u64;
        if total > max_bytes {
            discard(path).await;
            return Err(ApiError::bad_request("File exceeds 2GB limit"));
        }
        if let Err(err) = out.write_all(&chunk).await {
            discard(path).await;
            return Err(ApiError::internal(format!("could not write upload: {err}")));
        }
    }

    if let Err(err) = out.flush().await {
        discard(path).await;
        return Err(ApiError::internal(format!("could not flush upload: {err}")));
    }
    Ok(total)
}

/// Best-effort removal of a partial upload.
async fn discard(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}
