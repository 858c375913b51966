//! FFmpeg CLI wrapper for size-targeted video compression.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Wall-clock timeouts with process kill
//! - Target-bitrate computation for a hard size budget
//! - The `Encoder` seam the compression engine drives, with a two-pass
//!   libx264 implementation

pub mod bitrate;
pub mod command;
pub mod encode;
pub mod error;
pub mod probe;
pub mod progress;

pub use bitrate::{
    backoff_kbps, target_video_kbps, AUDIO_KBPS, MIN_VIDEO_KBPS, OVERSHOOT_BACKOFF, SIZE_MARGIN,
};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use encode::{
    attempt_timeout_secs, EncodeOutcome, EncodeRequest, Encoder, FfmpegEncoder, ProgressFn,
};
pub use error::{MediaError, MediaResult};
pub use probe::{get_duration, probe_video, VideoInfo};
pub use progress::FfmpegProgress;
