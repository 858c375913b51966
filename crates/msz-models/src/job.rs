//! Job record, provider and upsell definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::status::JobStatus;

/// Unique identifier for a compression job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Destination email provider. Fixes the attachment size ceiling and the
/// base price table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Gmail,
    Outlook,
    Other,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::Outlook => "outlook",
            Provider::Other => "other",
        }
    }

    /// Attachment ceiling the compressed output must not exceed, in MB.
    pub fn target_size_mb(&self) -> u64 {
        match self {
            Provider::Gmail => 25,
            Provider::Outlook => 20,
            Provider::Other => 15,
        }
    }

    /// Base price (USD) for a tier (1-3). Out-of-range tiers clamp to 3.
    pub fn base_price(&self, tier: u8) -> f64 {
        let table = match self {
            Provider::Gmail => [1.99, 2.99, 4.99],
            Provider::Outlook => [2.19, 3.29, 4.99],
            Provider::Other => [2.49, 3.99, 5.49],
        };
        table[(tier.clamp(1, 3) - 1) as usize]
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gmail" => Ok(Provider::Gmail),
            "outlook" => Ok(Provider::Outlook),
            "other" => Ok(Provider::Other),
            other => Err(format!("unknown email provider: {other}")),
        }
    }
}

/// Checkout upsells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Upsells {
    /// Jump the encode queue
    #[serde(default)]
    pub priority: bool,
    /// Generate a transcript alongside the video
    #[serde(default)]
    pub transcript: bool,
}

/// A compression job. Exclusively owned by the registry for its lifetime;
/// everything outside the registry only ever sees cloned snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Uploaded source file, deleted only by the cleanup scheduler
    pub source_path: PathBuf,

    /// Compressed output file, deleted only by the cleanup scheduler
    pub output_path: PathBuf,

    /// Upload size in bytes, probed at upload time
    pub size_bytes: u64,

    /// Video duration in seconds, probed at upload time
    pub duration_sec: u32,

    /// Destination provider (fixes the size ceiling)
    pub provider: Provider,

    /// Price bracket (1-3), derived once at upload
    pub tier: u8,

    /// Final price in USD; fixed at checkout confirmation
    pub price: f64,

    /// Checkout upsells
    #[serde(default)]
    pub upsells: Upsells,

    /// Notification address, set at checkout confirmation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress percentage, 0-100, monotone within the compressing stage
    #[serde(default)]
    pub progress_pct: u8,

    /// Human-readable current-stage description
    #[serde(default)]
    pub message: String,

    /// Download token; present exactly when status is done
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_token: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Payment confirmation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,

    /// Terminal-state timestamp; anchors the cleanup TTL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Terminal error detail (logs carry the root cause)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Guard against scheduling cleanup twice
    #[serde(default)]
    pub cleanup_scheduled: bool,
}

impl Job {
    /// Create a freshly uploaded job in the queued state.
    pub fn new(
        source_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        size_bytes: u64,
        duration_sec: u32,
        provider: Provider,
        tier: u8,
        price: f64,
    ) -> Self {
        Self {
            id: JobId::new(),
            source_path: source_path.into(),
            output_path: output_path.into(),
            size_bytes,
            duration_sec,
            provider,
            tier,
            price,
            upsells: Upsells::default(),
            email: None,
            status: JobStatus::Queued,
            progress_pct: 0,
            message: "Waiting for payment".to_string(),
            download_token: None,
            created_at: Utc::now(),
            paid_at: None,
            completed_at: None,
            error: None,
            cleanup_scheduled: false,
        }
    }

    /// Attachment ceiling for this job, in bytes.
    pub fn target_size_bytes(&self) -> u64 {
        self.provider.target_size_mb() * 1024 * 1024
    }

    /// Relative download URL, available once the job is done.
    pub fn download_url(&self) -> Option<String> {
        if self.status != JobStatus::Done {
            return None;
        }
        self.download_token
            .as_ref()
            .map(|token| format!("/download/{}/{}", self.id, token))
    }
}
