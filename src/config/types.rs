use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted application settings.
///
/// Loaded once at startup and threaded into the components that need it;
/// there is no mutable global settings state.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Directory for compressed output files. Unset = next to the input.
    #[serde(default)]
    pub output_directory: Option<PathBuf>,

    /// Scratch directory for in-progress output files. Unset = the scratch
    /// file lives next to the final output.
    #[serde(default)]
    pub temp_directory: Option<PathBuf>,

    /// Remove scratch files left behind by failed or cancelled jobs.
    #[serde(default = "default_true")]
    pub delete_temp_files: bool,

    /// Maximum number of simultaneously running encode jobs.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,

    /// UI theme name. Round-tripped for external presentation layers; the
    /// engine itself ignores it.
    #[serde(default = "default_theme")]
    pub theme: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub ffmpeg: FfmpegConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_directory: None,
            temp_directory: None,
            delete_temp_files: default_true(),
            max_concurrent_tasks: default_max_concurrent(),
            theme: default_theme(),
            logging: LoggingConfig::default(),
            ffmpeg: FfmpegConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    2
}

fn default_theme() -> String {
    "light".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Default log level when `RUST_LOG` is not set (debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Encoder parameters shared by every compression task.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FfmpegConfig {
    /// Video codec (default: libx264).
    #[serde(default = "default_codec")]
    pub codec: String,

    /// Pixel format passed to `-pix_fmt` (default: yuv420p).
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    /// Encoder thread count; 0 lets ffmpeg decide.
    #[serde(default)]
    pub threads: u32,

    /// Tuning profile passed to `-tune` (default: film).
    #[serde(default = "default_tune")]
    pub tune: String,

    /// Audio codec (default: aac).
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate (default: 128k).
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            pixel_format: default_pixel_format(),
            threads: 0,
            tune: default_tune(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
        }
    }
}

fn default_codec() -> String {
    "libx264".to_string()
}

fn default_pixel_format() -> String {
    "yuv420p".to_string()
}

fn default_tune() -> String {
    "film".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_audio_bitrate() -> String {
    "128k".to_string()
}

/// Overrides for external tool locations; unset tools are found via `PATH`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
}
