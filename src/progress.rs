//! FFmpeg diagnostic-stream parsing.
//!
//! ffmpeg has no machine-readable progress protocol on its default stderr
//! stream; it interleaves free-text log lines with stats lines like:
//!
//! ```text
//! frame=  120 fps=30 q=28.0 size=  2048kB time=00:00:04.00 bitrate=4194.3kbits/s speed=1.0x
//! ```
//!
//! [`parse_progress_line`] extracts whatever recognized tokens a line carries
//! into a [`ProgressUpdate`] and folds them into the job's
//! [`CompressionStats`]. Lines with no recognized token yield an empty update;
//! the parser never fails.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Instant;

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=(\d+):(\d+):(\d+\.?\d*)").unwrap());
static FRAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"frame=\s*(\d+)").unwrap());
static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"size=\s*(\d+)kB").unwrap());

/// Accumulated per-job encode statistics.
///
/// One instance lives for the duration of a single [`crate::job::EncodeJob`]
/// and is discarded when the job ends.
#[derive(Debug, Clone)]
pub struct CompressionStats {
    /// Wall-clock instant the encode started.
    pub start: Instant,
    /// Source duration in seconds (0 when unknown).
    pub total_duration: f64,
    /// Source frame count (0 when unknown).
    pub total_frames: u64,
    /// Source file size in bytes.
    pub input_size: u64,
    /// Seconds of source material encoded so far.
    pub processed_duration: f64,
    /// Frames encoded so far.
    pub processed_frames: u64,
    /// Encoding throughput in frames per wall-clock second.
    pub current_fps: f64,
    /// Current output size in bytes.
    pub current_size: u64,
    /// Estimated seconds remaining (0 until computable).
    pub estimated_remaining: f64,
}

impl CompressionStats {
    /// Create stats for a source with the given totals (0 = unknown).
    pub fn new(total_duration: f64, total_frames: u64, input_size: u64) -> Self {
        Self {
            start: Instant::now(),
            total_duration,
            total_frames,
            input_size,
            processed_duration: 0.0,
            processed_frames: 0,
            current_fps: 0.0,
            current_size: 0,
            estimated_remaining: 0.0,
        }
    }
}

/// Delta extracted from a single diagnostic line.
///
/// Every field is optional; a field is `None` when the corresponding token
/// was not present in the line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    /// Percentage of the source encoded, 0.0–100.0. Absent when the total
    /// duration is unknown.
    pub percentage: Option<f64>,
    /// Frames encoded so far.
    pub frame: Option<u64>,
    /// Encoding throughput in frames per second.
    pub fps: Option<f64>,
    /// Current output size in bytes.
    pub size_bytes: Option<u64>,
    /// Seconds of source material encoded.
    pub time_secs: Option<f64>,
    /// Estimated seconds remaining.
    pub eta_secs: Option<f64>,
}

impl ProgressUpdate {
    /// True when the line carried no recognized token.
    pub fn is_empty(&self) -> bool {
        *self == ProgressUpdate::default()
    }
}

/// Parse one line of ffmpeg stderr output, updating `stats` and returning the
/// extracted delta.
pub fn parse_progress_line(line: &str, stats: &mut CompressionStats) -> ProgressUpdate {
    let mut update = ProgressUpdate::default();

    if let Some(caps) = TIME_RE.captures(line) {
        let hours: f64 = caps[1].parse().unwrap_or(0.0);
        let minutes: f64 = caps[2].parse().unwrap_or(0.0);
        let seconds: f64 = caps[3].parse().unwrap_or(0.0);
        stats.processed_duration = hours * 3600.0 + minutes * 60.0 + seconds;
        update.time_secs = Some(stats.processed_duration);

        if stats.total_duration > 0.0 {
            let pct = (stats.processed_duration / stats.total_duration) * 100.0;
            update.percentage = Some(pct.min(100.0));
        }
    }

    if let Some(caps) = FRAME_RE.captures(line) {
        if let Ok(frames) = caps[1].parse::<u64>() {
            stats.processed_frames = frames;
            update.frame = Some(frames);

            let elapsed = stats.start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                stats.current_fps = stats.processed_frames as f64 / elapsed;
                update.fps = Some(stats.current_fps);

                if stats.total_frames > 0 && stats.current_fps > 0.0 {
                    let remaining = stats.total_frames.saturating_sub(stats.processed_frames);
                    stats.estimated_remaining = remaining as f64 / stats.current_fps;
                    update.eta_secs = Some(stats.estimated_remaining);
                }
            }
        }
    }

    if let Some(caps) = SIZE_RE.captures(line) {
        if let Ok(kb) = caps[1].parse::<u64>() {
            stats.current_size = kb * 1024;
            update.size_bytes = Some(stats.current_size);
        }
    }

    update
}

/// Format a user-facing status line from the current stats.
///
/// Example: `Progress: 40.0% [120/300 frames] FPS: 30.0 Size: 2.0MB ETA: 0:00:06`
pub fn format_status(stats: &CompressionStats, percentage: f64) -> String {
    let size_mb = stats.current_size as f64 / (1024.0 * 1024.0);
    format!(
        "Progress: {:.1}% [{}/{} frames] FPS: {:.1} Size: {:.1}MB ETA: {}",
        percentage,
        stats.processed_frames,
        stats.total_frames,
        stats.current_fps,
        size_mb,
        format_duration(stats.estimated_remaining as u64),
    )
}

/// Format whole seconds as `h:mm:ss`.
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}
