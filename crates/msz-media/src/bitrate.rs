//! Target-bitrate computation for a hard size budget.
//!
//! The encoder cannot be told "produce at most N bytes" directly; the budget
//! is expressed as an average video bitrate derived from the target size and
//! duration, with a margin for container overhead. Overshoot is handled by
//! the engine's bounded retry at a reduced rate.

/// Audio bitrate reserved out of the budget, in kbps.
pub const AUDIO_KBPS: u32 = 128;

/// Floor for the computed video bitrate; below this the output is unusable.
pub const MIN_VIDEO_KBPS: u32 = 150;

/// Fraction of the size budget given to the streams; the rest absorbs
/// container overhead.
pub const SIZE_MARGIN: f64 = 0.95;

/// Bitrate reduction factor applied on each overshoot retry.
pub const OVERSHOOT_BACKOFF: f64 = 0.9;

/// Compute the average video bitrate (kbps) that fits `target_size_mb`
/// within `duration_sec`, after reserving the audio track.
///
/// `target_size_mb * 8192` is the budget in kilobits (MB here is MiB, and
/// kbps/kilobits follow ffmpeg's convention of 1000-bit kilobits close
/// enough for the margin to absorb the difference).
pub fn target_video_kbps(target_size_mb: u64, duration_sec: u32) -> u32 {
    let duration = duration_sec.max(1) as f64;
    let total_kbps = (target_size_mb as f64 * 8192.0 * SIZE_MARGIN / duration).floor() as i64;
    let video_kbps = total_kbps - AUDIO_KBPS as i64;
    video_kbps.max(MIN_VIDEO_KBPS as i64) as u32
}

/// Apply one overshoot backoff step, keeping the floor.
pub fn backoff_kbps(kbps: u32) -> u32 {
    (((kbps as f64) * OVERSHOOT_BACKOFF).floor() as u32).max(MIN_VIDEO_KBPS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gmail_budget_for_eight_minutes() {
        // 25MB over 480s: 25 * 8192 * 0.95 / 480 = 405.33 -> 405, minus audio
        let kbps = target_video_kbps(25, 480);
        assert_eq!(kbps, 405 - 128);
    }

    #[test]
    fn short_clips_get_generous_rates() {
        let kbps = target_video_kbps(25, 30);
        assert!(kbps > 6000);
    }

    #[test]
    fn degenerate_inputs_clamp_to_floor() {
        // Long duration starves the budget; the floor keeps output usable
        assert_eq!(target_video_kbps(15, 1200), MIN_VIDEO_KBPS);
        // Zero duration must not divide by zero
        assert!(target_video_kbps(25, 0) > 0);
    }

    #[test]
    fn backoff_reduces_by_ten_percent_until_floor() {
        assert_eq!(backoff_kbps(1000), 900);
        assert_eq!(backoff_kbps(900), 810);
        assert_eq!(backoff_kbps(MIN_VIDEO_KBPS + 1), MIN_VIDEO_KBPS);
        assert_eq!(backoff_kbps(MIN_VIDEO_KBPS), MIN_VIDEO_KBPS);
    }
}
