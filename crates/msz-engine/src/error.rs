//! Error types for the job pipeline.

use msz_models::{JobStatus, PricingError};
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Pipeline error taxonomy.
///
/// `InvalidInput`, `Checkout` and `NotFound` are request-time errors returned
/// to the caller. `Encode` and `Storage` only ever occur inside a background
/// task, where they are converted into an `error` transition and logged.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("checkout rejected: {0}")]
    Checkout(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("illegal transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("email dispatch failed: {0}")]
    Email(String),

    #[error("media error: {0}")]
    Media(#[from] msz_media::MediaError),
}

impl EngineError {
    pub fn not_found(job_id: impl std::fmt::Display) -> Self {
        Self::NotFound(job_id.to_string())
    }

    pub fn checkout(msg: impl Into<String>) -> Self {
        Self::Checkout(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

impl From<PricingError> for EngineError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::InvalidInput(msg) => Self::InvalidInput(msg),
        }
    }
}
