//! FFprobe-based media probing.
//!
//! One probe call runs before each encode so percentage and ETA are available
//! from the first progress line.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Metadata for the first video stream and the container.
///
/// Individual fields default to 0 when ffprobe does not report them (e.g.
/// `nb_frames` is absent for many stream-copied files); only a total failure
/// to run the prober is an error.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Container duration in seconds, falling back to the stream duration.
    pub duration_secs: f64,
    pub frame_count: u64,
    pub file_size: u64,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    nb_frames: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

/// Probe a video file using ffprobe.
///
/// `ffprobe` is the resolved prober path from the
/// [`ToolRegistry`](crate::tools::ToolRegistry).
pub async fn probe_video(ffprobe: &Path, input: &Path) -> Result<VideoInfo> {
    let output = tokio::process::Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,duration,nb_frames",
            "-show_entries",
            "format=duration,size",
            "-of",
            "json",
        ])
        .arg(input)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Probe("ffprobe not found; is it installed and in PATH?".to_string())
            } else {
                Error::Probe(format!("failed to run ffprobe: {e}"))
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Probe(format!(
            "ffprobe exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let json = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&json)
}

/// Decode ffprobe's JSON output into a [`VideoInfo`].
///
/// ffprobe reports numeric fields as JSON strings; each is parsed leniently
/// and defaults to 0 when absent or malformed.
pub fn parse_probe_output(json: &str) -> Result<VideoInfo> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Probe(format!("unparseable ffprobe output: {e}")))?;

    let stream = output.streams.first();

    let stream_duration = stream
        .and_then(|s| s.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok());
    let format_duration = output
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok());

    Ok(VideoInfo {
        width: stream.and_then(|s| s.width).unwrap_or(0),
        height: stream.and_then(|s| s.height).unwrap_or(0),
        duration_secs: format_duration.or(stream_duration).unwrap_or(0.0),
        frame_count: stream
            .and_then(|s| s.nb_frames.as_deref())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        file_size: output
            .format
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
    })
}
