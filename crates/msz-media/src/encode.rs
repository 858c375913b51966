//! The encoder seam the compression engine drives.
//!
//! `Encoder` is the narrow process-boundary interface: one call, one encode
//! attempt, progress reported as a plain 0..1 fraction. The engine's retry
//! and stage-mapping logic is independent of the binary behind it, and tests
//! substitute scripted encoders.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Progress callback: overall fraction of the attempt, 0.0..=1.0.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// One encode attempt.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    /// Source file
    pub input: PathBuf,
    /// Destination file
    pub output: PathBuf,
    /// Average video bitrate for this attempt, kbps
    pub video_kbps: u32,
    /// Audio bitrate, kbps
    pub audio_kbps: u32,
    /// Source duration, seconds
    pub duration_sec: u32,
    /// Wall-clock budget for the whole attempt, seconds
    pub timeout_secs: u64,
}

/// Result of a successful encode attempt.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOutcome {
    /// Size of the produced output file, bytes
    pub output_bytes: u64,
}

/// A single-attempt video encoder.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Run one encode attempt. The output file must exist and be non-empty
    /// on success; empty or missing output is an error even when the
    /// underlying process exited cleanly.
    async fn encode(&self, req: &EncodeRequest, on_progress: ProgressFn) -> MediaResult<EncodeOutcome>;
}

/// Wall-clock budget for one encode attempt: a multiple of the source
/// duration, floored for very short inputs and hard-capped at an hour.
pub fn attempt_timeout_secs(duration_sec: u32) -> u64 {
    (duration_sec as u64 * 10).clamp(120, 3600)
}

/// Two-pass libx264 encoder. Pass 1 analyzes into the rate-control log
/// (null muxer, audio dropped), pass 2 produces the output. Two-pass keeps
/// the average rate close enough to target that the size budget holds in
/// one attempt for typical sources.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    preset: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self {
            preset: "fast".to_string(),
        }
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, req: &EncodeRequest, on_progress: ProgressFn) -> MediaResult<EncodeOutcome> {
        if !req.input.exists() {
            return Err(MediaError::FileNotFound(req.input.clone()));
        }

        let duration_ms = req.duration_sec as i64 * 1000;
        let pass_log = req.output.with_extension("2pass");
        let started = Instant::now();

        debug!(
            input = %req.input.display(),
            video_kbps = req.video_kbps,
            "starting two-pass encode"
        );

        // Pass 1: analysis into the rate-control log
        let pass1 = FfmpegCommand::analysis(&req.input)
            .video_codec("libx264")
            .video_bitrate_kbps(req.video_kbps)
            .preset(&self.preset)
            .no_audio()
            .pass(1, &pass_log);

        let cb = Arc::clone(&on_progress);
        FfmpegRunner::new()
            .with_timeout(req.timeout_secs)
            .run_with_progress(&pass1, move |p| cb(p.fraction(duration_ms) * 0.5))
            .await?;

        // Pass 2: the actual encode, within the remaining wall-clock budget
        let remaining = req
            .timeout_secs
            .saturating_sub(started.elapsed().as_secs())
            .max(1);

        let pass2 = FfmpegCommand::new(&req.input, &req.output)
            .video_codec("libx264")
            .video_bitrate_kbps(req.video_kbps)
            .preset(&self.preset)
            .audio_codec("aac")
            .audio_bitrate_kbps(req.audio_kbps)
            .pass(2, &pass_log)
            .faststart();

        let cb = Arc::clone(&on_progress);
        let result = FfmpegRunner::new()
            .with_timeout(remaining)
            .run_with_progress(&pass2, move |p| cb(0.5 + p.fraction(duration_ms) * 0.5))
            .await;

        // Rate-control logs are per-attempt scratch
        let log_prefix = pass_log.to_string_lossy();
        let _ = tokio::fs::remove_file(format!("{}-0.log", log_prefix)).await;
        let _ = tokio::fs::remove_file(format!("{}-0.log.mbtree", log_prefix)).await;

        result?;

        let output_bytes = match tokio::fs::metadata(&req.output).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            _ => return Err(MediaError::EmptyOutput(req.output.clone())),
        };

        Ok(EncodeOutcome { output_bytes })
    }
}
