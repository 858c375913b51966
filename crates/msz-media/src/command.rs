//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{parse_progress_line, FfmpegProgress};

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path; `None` sends the encode to the null muxer
    /// (the analysis pass of a two-pass encode)
    output: Option<PathBuf>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command producing `output`.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: Some(output.as_ref().to_path_buf()),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Create an analysis-only command (null muxer, no output file).
    pub fn analysis(input: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: None,
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set average video bitrate in kbps.
    pub fn video_bitrate_kbps(self, kbps: u32) -> Self {
        self.output_arg("-b:v").output_arg(format!("{}k", kbps))
    }

    /// Set encoding preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set audio bitrate in kbps.
    pub fn audio_bitrate_kbps(self, kbps: u32) -> Self {
        self.output_arg("-b:a").output_arg(format!("{}k", kbps))
    }

    /// Drop the audio stream.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Select a pass of a two-pass encode, with the rate-control log prefix.
    pub fn pass(self, number: u8, log_prefix: impl AsRef<Path>) -> Self {
        self.output_arg("-pass")
            .output_arg(number.to_string())
            .output_arg("-passlogfile")
            .output_arg(log_prefix.as_ref().to_string_lossy().to_string())
    }

    /// Move the moov atom to the front for streamable MP4 output.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        match &self.output {
            Some(path) => args.push(path.to_string_lossy().to_string()),
            None => {
                args.push("-f".to_string());
                args.push("null".to_string());
                args.push("-".to_string());
            }
        }

        args
    }
}

/// Runner for FFmpeg commands with progress tracking and a wall-clock timeout.
#[derive(Debug, Default)]
pub struct FfmpegRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    /// Set the wall-clock timeout; on expiry the process is killed.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with a progress callback.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child.stderr.take().ok_or_else(|| {
            MediaError::ffmpeg_failed("stderr not captured", None, None)
        })?;
        let mut reader = BufReader::new(stderr).lines();

        // Drain stderr on a separate task so the pipe never backs up
        let progress_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();

            while let Ok(Some(line)) = reader.next_line().await {
                if let Some(progress) = parse_progress_line(&line, &mut current) {
                    progress_callback(progress);
                }
            }
        });

        let result = self.wait_for_completion(&mut child).await;

        let _ = progress_handle.await;

        result
    }

    /// Wait for the child, killing it on timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        let status = if let Some(timeout_secs) = self.timeout_secs {
            let timeout = tokio::time::timeout(
                std::time::Duration::from_secs(timeout_secs),
                child.wait(),
            );
            match timeout.await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("FFmpeg timed out after {} seconds, killing process", timeout_secs);
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(timeout_secs));
                }
            }
        } else {
            child.wait().await?
        };

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                None,
                status.code(),
            ))
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_pass_args_in_order() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .video_codec("libx264")
            .video_bitrate_kbps(1200)
            .preset("fast")
            .audio_codec("aac")
            .audio_bitrate_kbps(128)
            .pass(2, "/tmp/job-2pass")
            .faststart();

        let args = cmd.build_args();
        assert!(args.contains(&"-b:v".to_string()));
        assert!(args.contains(&"1200k".to_string()));
        assert!(args.contains(&"-pass".to_string()));
        assert!(args.contains(&"2".to_string()));
        assert!(args.contains(&"+faststart".to_string()));
        assert_eq!(args.last().unwrap(), "output.mp4");

        // input comes before output args
        let i_pos = args.iter().position(|a| a == "-i").unwrap();
        let bv_pos = args.iter().position(|a| a == "-b:v").unwrap();
        assert!(i_pos < bv_pos);
    }

    #[test]
    fn analysis_pass_targets_null_muxer() {
        let cmd = FfmpegCommand::analysis("input.mp4")
            .video_codec("libx264")
            .video_bitrate_kbps(1200)
            .no_audio()
            .pass(1, "/tmp/job-2pass");

        let args = cmd.build_args();
        assert!(args.contains(&"-an".to_string()));
        assert!(args.contains(&"null".to_string()));
        assert_eq!(args.last().unwrap(), "-");
    }

    #[test]
    fn progress_pipe_always_requested() {
        let args = FfmpegCommand::new("a.mp4", "b.mp4").build_args();
        let pos = args.iter().position(|a| a == "-progress").unwrap();
        assert_eq!(args[pos + 1], "pipe:2");
    }
}
