//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information parsed from FFmpeg's `-progress pipe:2` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fraction of the input consumed so far, 0.0..=1.0.
    pub fn fraction(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        (self.out_time_ms as f64 / total_duration_ms as f64).clamp(0.0, 1.0)
    }
}

/// Parse a `key=value` line from FFmpeg's progress output.
///
/// Returns an updated snapshot when the block-terminating `progress=` key is
/// seen; individual keys only mutate the accumulator.
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let line = line.trim();

    if let Some((key, value)) = line.split_once('=') {
        match key {
            "out_time_ms" | "out_time_us" => {
                // Despite the name, both keys carry microseconds on modern builds
                if let Ok(us) = value.parse::<i64>() {
                    current.out_time_ms = us / 1000;
                }
            }
            "speed" => {
                // Format: "1.5x" or "N/A"
                if let Some(speed_str) = value.strip_suffix('x') {
                    if let Ok(speed) = speed_str.parse() {
                        current.speed = speed;
                    }
                }
            }
            "progress" => {
                // "continue" or "end"
                if value == "end" {
                    current.is_complete = true;
                }
                return Some(current.clone());
            }
            _ => {}
        }
    }

    None
}
