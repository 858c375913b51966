//! The compression pipeline.
//!
//! One background task per paid job. The engine never touches job fields
//! directly: every stage change goes through the registry's transition API
//! and is fanned out through the broadcaster, so subscribers always observe
//! the same consistent snapshots.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use msz_media::{
    attempt_timeout_secs, backoff_kbps, target_video_kbps, EncodeRequest, Encoder, ProgressFn,
    AUDIO_KBPS,
};
use msz_models::{JobId, JobStatus, ProgressEvent};

use crate::broadcast::EventBroadcaster;
use crate::cleanup::{CleanupScheduler, DEFAULT_TTL_MIN};
use crate::error::{EngineError, EngineResult};
use crate::mailer::Mailer;
use crate::registry::{JobRegistry, StageUpdate};

/// Stage bands of the overall progress percentage.
const COMPRESS_START_PCT: u8 = 5;
const COMPRESS_END_PCT: u8 = 90;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Artifact lifetime after a terminal state
    pub ttl: Duration,
    /// Absolute base for download URLs in notification emails
    pub public_base_url: String,
    /// Overshoot retry budget per job
    pub max_overshoot_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_MIN * 60),
            public_base_url: "http://localhost:8000".to_string(),
            max_overshoot_retries: 2,
        }
    }
}

/// Drives a job from payment confirmation to a terminal state.
pub struct CompressionEngine {
    registry: Arc<JobRegistry>,
    broadcaster: Arc<EventBroadcaster>,
    encoder: Arc<dyn Encoder>,
    mailer: Mailer,
    cleanup: CleanupScheduler,
    config: EngineConfig,
}

impl CompressionEngine {
    pub fn new(
        registry: Arc<JobRegistry>,
        broadcaster: Arc<EventBroadcaster>,
        encoder: Arc<dyn Encoder>,
        mailer: Mailer,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            encoder,
            mailer,
            cleanup: CleanupScheduler::new(config.ttl),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    /// Spawn the job's single background compression task.
    ///
    /// Callers must only do this for a `Confirmed::Started` job; the
    /// registry's CAS guarantees one winner per job.
    pub fn spawn(self: &Arc<Self>, job_id: JobId) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run(job_id).await })
    }

    /// Run the pipeline, converting every failure into an `error` transition.
    /// Nothing escapes the task boundary.
    pub async fn run(&self, job_id: JobId) {
        if let Err(err) = self.process(&job_id).await {
            self.fail(&job_id, &err);
        }
    }

    async fn process(&self, job_id: &JobId) -> EngineResult<()> {
        let job = self
            .registry
            .get(job_id)
            .ok_or_else(|| EngineError::not_found(job_id))?;

        self.advance(
            job_id,
            JobStatus::Processing,
            StageUpdate::progress(2, "Preparing encode"),
        )?;

        let target_bytes = job.target_size_bytes();
        let mut video_kbps = target_video_kbps(job.provider.target_size_mb(), job.duration_sec);
        let timeout_secs = attempt_timeout_secs(job.duration_sec);

        self.advance(
            job_id,
            JobStatus::Compressing,
            StageUpdate::progress(COMPRESS_START_PCT, "Compressing video"),
        )?;

        let mut attempt: u32 = 0;
        let outcome = loop {
            info!(
                job_id = %job_id,
                attempt,
                video_kbps,
                timeout_secs,
                "starting encode attempt"
            );

            let request = EncodeRequest {
                input: job.source_path.clone(),
                output: job.output_path.clone(),
                video_kbps,
                audio_kbps: AUDIO_KBPS,
                duration_sec: job.duration_sec,
                timeout_secs,
            };
            let outcome = self.encoder.encode(&request, self.progress_tap(job_id)).await?;

            if outcome.output_bytes <= target_bytes {
                break outcome;
            }
            if attempt >= self.config.max_overshoot_retries {
                return Err(EngineError::encode(format!(
                    "output {} bytes still over the {} byte target after {} retries",
                    outcome.output_bytes, target_bytes, attempt
                )));
            }

            attempt += 1;
            video_kbps = backoff_kbps(video_kbps);
            warn!(
                job_id = %job_id,
                output_bytes = outcome.output_bytes,
                target_bytes,
                retry = attempt,
                video_kbps,
                "output over target, re-encoding"
            );
            self.advance(
                job_id,
                JobStatus::Compressing,
                StageUpdate {
                    message: Some("Re-encoding at a lower bitrate".to_string()),
                    ..Default::default()
                },
            )?;
        };

        // The encoder has verified a non-empty output; remux/validation is
        // folded into pass 2, so finalizing is a short hop.
        self.advance(
            job_id,
            JobStatus::Finalizing,
            StageUpdate::progress(COMPRESS_END_PCT, "Finalizing output"),
        )?;

        let token = Uuid::new_v4().simple().to_string();
        let done = self.registry.transition(
            job_id,
            JobStatus::Done,
            StageUpdate {
                progress_pct: Some(100),
                message: Some("Your video is ready".to_string()),
                download_token: Some(token),
                ..Default::default()
            },
        )?;
        self.broadcaster
            .publish(job_id, ProgressEvent::of_job(&done));
        info!(
            job_id = %job_id,
            output_bytes = outcome.output_bytes,
            "compression complete"
        );

        if let (Some(recipient), Some(path)) = (done.email.clone(), done.download_url()) {
            let url = format!("{}{}", self.config.public_base_url.trim_end_matches('/'), path);
            let expiry_min = self.config.ttl.as_secs() / 60;
            let mailer = self.mailer.clone();
            let mail_job_id = job_id.clone();
            tokio::spawn(async move {
                if let Err(err) = mailer.send_download_ready(&recipient, &url, expiry_min).await {
                    warn!(job_id = %mail_job_id, error = %err, "completion email failed");
                }
            });
        }

        self.cleanup
            .schedule(Arc::clone(&self.registry), job_id.clone());
        Ok(())
    }

    /// Transition and publish the resulting snapshot.
    fn advance(
        &self,
        job_id: &JobId,
        status: JobStatus,
        update: StageUpdate,
    ) -> EngineResult<()> {
        let snapshot = self.registry.transition(job_id, status, update)?;
        self.broadcaster
            .publish(job_id, ProgressEvent::of_job(&snapshot));
        Ok(())
    }

    /// Record a terminal failure. The user-visible message stays generic;
    /// the root cause goes to the log and the job's error field.
    fn fail(&self, job_id: &JobId, err: &EngineError) {
        error!(job_id = %job_id, error = %err, "compression pipeline failed");

        match self.registry.transition(
            job_id,
            JobStatus::Error,
            StageUpdate {
                message: Some("Processing failed".to_string()),
                error: Some(err.to_string()),
                ..Default::default()
            },
        ) {
            Ok(snapshot) => {
                self.broadcaster
                    .publish(job_id, ProgressEvent::of_job(&snapshot));
                self.cleanup
                    .schedule(Arc::clone(&self.registry), job_id.clone());
            }
            Err(transition_err) => {
                warn!(job_id = %job_id, error = %transition_err, "could not record failure");
            }
        }
    }

    /// Progress callback for one encode attempt: maps the encoder's 0..1
    /// fraction onto the compressing band and rate-limits publication to
    /// whole-point advances.
    fn progress_tap(&self, job_id: &JobId) -> ProgressFn {
        let registry = Arc::clone(&self.registry);
        let broadcaster = Arc::clone(&self.broadcaster);
        let job_id = job_id.clone();
        let last = AtomicU8::new(COMPRESS_START_PCT);

        Arc::new(move |fraction: f64| {
            let pct = map_compress_pct(fraction);
            let prev = last.fetch_max(pct, Ordering::Relaxed);
            if pct <= prev {
                return;
            }
            if let Ok(snapshot) = registry.transition(
                &job_id,
                JobStatus::Compressing,
                StageUpdate {
                    progress_pct: Some(pct),
                    ..Default::default()
                },
            ) {
                broadcaster.publish(&job_id, ProgressEvent::of_job(&snapshot));
            }
        })
    }
}

/// Map an encode fraction onto the 5-90 compressing band.
fn map_compress_pct(fraction: f64) -> u8 {
    let span = (COMPRESS_END_PCT - COMPRESS_START_PCT) as f64;
    (COMPRESS_START_PCT as f64 + fraction.clamp(0.0, 1.0) * span).round() as u8
}
