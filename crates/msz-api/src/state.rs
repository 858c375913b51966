//! Application state.

use std::sync::Arc;

use msz_engine::{CompressionEngine, EngineConfig, EventBroadcaster, JobRegistry, Mailer};
use msz_media::{Encoder, FfmpegEncoder};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub registry: Arc<JobRegistry>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub engine: Arc<CompressionEngine>,
}

impl AppState {
    /// Create new application state with the production ffmpeg encoder.
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let encoder: Arc<dyn Encoder> = Arc::new(FfmpegEncoder::new());
        Self::with_encoder(config, encoder)
    }

    /// Create application state with a specific encoder (tests).
    pub fn with_encoder(config: ApiConfig, encoder: Arc<dyn Encoder>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.upload_dir)?;

        let registry = Arc::new(JobRegistry::new());
        let broadcaster = Arc::new(EventBroadcaster::new());
        let engine = Arc::new(CompressionEngine::new(
            Arc::clone(&registry),
            Arc::clone(&broadcaster),
            encoder,
            Mailer::from_env(),
            EngineConfig {
                ttl: config.download_ttl,
                public_base_url: config.public_base_url.clone(),
                max_overshoot_retries: 2,
            },
        ));

        Ok(Self {
            config,
            registry,
            broadcaster,
            engine,
        })
    }
}
