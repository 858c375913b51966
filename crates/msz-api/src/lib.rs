//! Axum HTTP API server for MailSized.
//!
//! Thin handlers over the job pipeline: multipart upload, checkout
//! confirmation, SSE progress stream, result/download and health.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
