//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Directory for uploaded and compressed files
    pub upload_dir: PathBuf,
    /// Absolute base for download URLs (emails, result endpoint)
    pub public_base_url: String,
    /// Artifact lifetime after job completion
    pub download_ttl: Duration,
    /// Hard upload cap in bytes
    pub max_upload_bytes: u64,
    /// Environment (development/production)
    pub environment: String,
}

const GB: u64 = 1024 * 1024 * 1024;

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            upload_dir: PathBuf::from("temp_uploads"),
            public_base_url: "http://localhost:8000".to_string(),
            download_ttl: Duration::from_secs(30 * 60),
            max_upload_bytes: 2 * GB,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            download_ttl: Duration::from_secs(
                std::env::var("DOWNLOAD_TTL_MIN")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(30)
                    * 60,
            ),
            max_upload_bytes: defaults.max_upload_bytes,
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
