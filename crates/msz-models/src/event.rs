//! Progress event schema for the SSE stream.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::Job;
use crate::status::JobStatus;

/// One frame of a job's progress stream.
///
/// This is the JSON body the progress endpoint emits, one message per event:
/// `{status, progress, message, download_url?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressEvent {
    /// Job status at the time of emission
    pub status: JobStatus,
    /// Progress percentage, 0-100
    pub progress: u8,
    /// Human-readable stage description
    pub message: String,
    /// Present only on the terminal `done` event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl ProgressEvent {
    /// Snapshot a job's externally visible state.
    pub fn of_job(job: &Job) -> Self {
        Self {
            status: job.status,
            progress: job.progress_pct,
            message: job.message.clone(),
            download_url: job.download_url(),
        }
    }

    /// Terminal frame for a stream opened against an unknown job.
    pub fn not_found() -> Self {
        Self {
            status: JobStatus::Error,
            progress: 0,
            message: "Job not found".to_string(),
            download_url: None,
        }
    }

    /// Whether this event closes the stream.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
