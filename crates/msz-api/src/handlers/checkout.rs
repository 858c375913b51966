use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use msz_engine::Confirmed;
use msz_models::{JobId, Upsells};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub job_id: String,
    #[serde(default)]
    pub priority: bool,
    #[serde(default)]
    pub transcript: bool,
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub job_id: String,
    pub status: String,
    pub price: f64,
}

/// `POST /checkout` — confirm payment and start compression exactly once.
pub async fn checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    req.validate()
        .map_err(|err| ApiError::validation(format!("invalid checkout payload: {err}")))?;

    let job_id = JobId::from_string(&req.job_id);
    let upsells = Upsells {
        priority: req.priority,
        transcript: req.transcript,
    };

    let confirmed = state
        .registry
        .confirm_paid(&job_id, upsells, req.email.clone())?;

    let job = match confirmed {
        Confirmed::Started(job) => {
            info!(job_id = %job.id, price = job.price, "payment confirmed, starting compression");
            state.engine.spawn(job.id.clone());
            job
        }
        Confirmed::AlreadyPaid(job) => job,
    };

    Ok(Json(CheckoutResponse {
        job_id: job.id.to_string(),
        status: job.status.as_str().to_string(),
        price: job.price,
    }))
}
