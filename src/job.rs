//! Single-file encode job.
//!
//! An [`EncodeJob`] owns one ffmpeg child process from launch to settlement.
//! The manager spawns one tokio task per job; everything here runs on that
//! task, including the stderr drain loop.

use crate::config::FfmpegConfig;
use crate::error::{Error, Result};
use crate::probe::probe_video;
use crate::progress::{format_duration, format_status, parse_progress_line, CompressionStats};
use crate::request::CompressionRequest;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Number of trailing diagnostic lines kept for failure messages.
const STDERR_TAIL_LINES: usize = 20;

/// One encode of one input file.
pub struct EncodeJob {
    request: CompressionRequest,
    ffmpeg_config: FfmpegConfig,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    delete_temp_files: bool,
}

impl EncodeJob {
    pub fn new(
        request: CompressionRequest,
        ffmpeg_config: FfmpegConfig,
        ffmpeg: PathBuf,
        ffprobe: PathBuf,
        delete_temp_files: bool,
    ) -> Self {
        Self {
            request,
            ffmpeg_config,
            ffmpeg,
            ffprobe,
            delete_temp_files,
        }
    }

    /// Run the encode to completion.
    ///
    /// `on_progress` is invoked with (percentage, formatted status line) for
    /// each stderr line that carried progress tokens. Returns the success
    /// summary, or the error that settled the job. Cancellation kills the
    /// child and returns [`Error::Cancelled`]; it never reaches the success
    /// or failure branches.
    pub async fn run<F>(&self, cancel: &CancellationToken, mut on_progress: F) -> Result<String>
    where
        F: FnMut(u8, String),
    {
        let info = probe_video(&self.ffprobe, &self.request.input)
            .await
            .map_err(|e| Error::Probe(format!("Failed to get video information: {e}")))?;

        if !self.request.input.exists() {
            return Err(Error::not_found(
                "input file",
                self.request.input.display(),
            ));
        }

        let mut stats = CompressionStats::new(info.duration_secs, info.frame_count, info.file_size);

        let scratch = scratch_path(&self.request);
        if let Some(parent) = scratch.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = build_args(&self.request, &self.ffmpeg_config, &scratch);
        debug!(input = %self.request.input.display(), ?args, "launching encoder");

        let mut child = tokio::process::Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool("ffmpeg", format!("failed to launch: {e}")))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("child stderr was not captured".to_string()))?;
        let mut lines = BufReader::new(stderr).lines();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(input = %self.request.input.display(), "cancelling encode");
                    if let Err(e) = child.kill().await {
                        warn!("failed to kill encoder process: {e}");
                    }
                    self.cleanup_scratch(&scratch);
                    return Err(Error::Cancelled);
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            // ffmpeg separates in-place stats updates with \r.
                            for chunk in line.split('\r') {
                                self.handle_line(chunk, &mut stats, &mut tail, &mut on_progress);
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("error reading encoder output: {e}");
                            break;
                        }
                    }
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("failed to kill encoder process: {e}");
                }
                self.cleanup_scratch(&scratch);
                return Err(Error::Cancelled);
            }
            status = child.wait() => status?,
        };

        if !status.success() {
            self.cleanup_scratch(&scratch);
            let detail: Vec<String> = tail.into_iter().collect();
            return Err(Error::tool(
                "ffmpeg",
                format!("exited with {}: {}", status, detail.join(" | ")),
            ));
        }

        match self.finalize(&scratch, &stats).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                // A failed move leaves the scratch file behind otherwise.
                self.cleanup_scratch(&scratch);
                Err(e)
            }
        }
    }

    fn handle_line<F>(
        &self,
        line: &str,
        stats: &mut CompressionStats,
        tail: &mut VecDeque<String>,
        on_progress: &mut F,
    ) where
        F: FnMut(u8, String),
    {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_string());

        let update = parse_progress_line(line, stats);
        if update.is_empty() {
            return;
        }

        let percentage = update.percentage.unwrap_or_else(|| {
            if stats.total_duration > 0.0 {
                (stats.processed_duration / stats.total_duration * 100.0).min(100.0)
            } else {
                0.0
            }
        });
        on_progress(percentage.round() as u8, format_status(stats, percentage));
    }

    /// Move the scratch file into place, verify it, and build the summary.
    async fn finalize(&self, scratch: &Path, stats: &CompressionStats) -> Result<String> {
        if let Err(rename_err) = tokio::fs::rename(scratch, &self.request.output).await {
            // Rename fails across filesystems; fall back to copy + remove.
            debug!("rename failed ({rename_err}), copying instead");
            tokio::fs::copy(scratch, &self.request.output).await?;
            tokio::fs::remove_file(scratch).await?;
        }

        let output_size = tokio::fs::metadata(&self.request.output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if output_size == 0 {
            return Err(Error::tool(
                "ffmpeg",
                "encoder produced an empty output file",
            ));
        }

        let input_mb = stats.input_size as f64 / (1024.0 * 1024.0);
        let output_mb = output_size as f64 / (1024.0 * 1024.0);
        let reduction = if stats.input_size > 0 {
            (stats.input_size.saturating_sub(output_size)) as f64 / stats.input_size as f64 * 100.0
        } else {
            0.0
        };
        let elapsed = stats.start.elapsed().as_secs_f64();
        let average_fps = if elapsed > 0.0 {
            stats.total_frames as f64 / elapsed
        } else {
            0.0
        };

        let summary = summary_message(reduction, input_mb, output_mb, elapsed as u64, average_fps);
        info!(output = %self.request.output.display(), "{summary}");
        Ok(summary)
    }

    fn cleanup_scratch(&self, scratch: &Path) {
        if !self.delete_temp_files || !scratch.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_file(scratch) {
            warn!("failed to remove scratch file {:?}: {e}", scratch);
        }
    }
}

/// In-progress output location: `temp_<output basename>` in the scratch
/// directory, or next to the final output when no scratch dir is set.
pub fn scratch_path(request: &CompressionRequest) -> PathBuf {
    let basename = request
        .output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());

    let dir = request
        .temp_dir
        .clone()
        .or_else(|| request.output.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    dir.join(format!("temp_{basename}"))
}

/// Build the encoder argument list. Deterministic for a given request and
/// config, so it is unit-testable without running anything.
pub fn build_args(
    request: &CompressionRequest,
    config: &FfmpegConfig,
    scratch: &Path,
) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        request.input.display().to_string(),
        "-c:v".to_string(),
        request.codec.clone(),
        "-preset".to_string(),
        request.preset.as_ffmpeg_arg().to_string(),
        "-crf".to_string(),
        request.crf.to_string(),
    ];

    if let Some((width, height)) = request.resolution {
        args.push("-vf".to_string());
        args.push(format!("scale={width}:{height}"));
    }

    if let Some(ref bitrate) = request.bitrate {
        args.push("-b:v".to_string());
        args.push(bitrate.clone());
    }

    if !config.pixel_format.is_empty() {
        args.push("-pix_fmt".to_string());
        args.push(config.pixel_format.clone());
    }

    if config.threads > 0 {
        args.push("-threads".to_string());
        args.push(config.threads.to_string());
    }

    if !config.tune.is_empty() {
        args.push("-tune".to_string());
        args.push(config.tune.clone());
    }

    args.push("-c:a".to_string());
    args.push(config.audio_codec.clone());

    if !config.audio_bitrate.is_empty() {
        args.push("-b:a".to_string());
        args.push(config.audio_bitrate.clone());
    }

    args.push("-y".to_string());
    args.push(scratch.display().to_string());

    args
}

/// Multi-line success summary shown to the user.
fn summary_message(
    reduction: f64,
    input_mb: f64,
    output_mb: f64,
    elapsed_secs: u64,
    average_fps: f64,
) -> String {
    format!(
        "Compression successful!\n\
         Size reduced by {reduction:.1}%\n\
         Original: {input_mb:.1}MB → Compressed: {output_mb:.1}MB\n\
         Time taken: {}\n\
         Average FPS: {average_fps:.1}",
        format_duration(elapsed_secs),
    )
}
