//! Compression request types and validation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Encoder speed/quality trade-off, mapped to ffmpeg preset tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedPreset {
    /// `ultrafast` - largest output, fastest encode.
    Fast,
    /// `medium` - the ffmpeg default trade-off.
    Balanced,
    /// `veryslow` - smallest output, slowest encode.
    Best,
}

impl SpeedPreset {
    /// The token passed to ffmpeg's `-preset` flag.
    pub fn as_ffmpeg_arg(&self) -> &'static str {
        match self {
            SpeedPreset::Fast => "ultrafast",
            SpeedPreset::Balanced => "medium",
            SpeedPreset::Best => "veryslow",
        }
    }
}

impl std::str::FromStr for SpeedPreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "best" => Ok(Self::Best),
            _ => Err(format!("Unknown speed preset: {} (expected fast, balanced or best)", s)),
        }
    }
}

/// One batch-compression request. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionRequest {
    /// Source video file.
    pub input: PathBuf,
    /// Destination for the compressed output.
    pub output: PathBuf,
    /// Video codec passed to `-c:v` (e.g. "libx264").
    pub codec: String,
    /// Encoder speed/quality preset.
    pub preset: SpeedPreset,
    /// Constant rate factor, 0-51 (lower = higher quality).
    pub crf: u8,
    /// Optional target resolution as (width, height).
    #[serde(default)]
    pub resolution: Option<(u32, u32)>,
    /// Optional target video bitrate token (e.g. "2M").
    #[serde(default)]
    pub bitrate: Option<String>,
    /// Optional scratch directory; when set, output is written to a temp file
    /// there and atomically moved into place on success.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Enforce the common-aspect-ratio check on custom resolutions.
    #[serde(default)]
    pub strict: bool,
}

impl CompressionRequest {
    /// Create a request with the default codec and quality settings.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            codec: "libx264".to_string(),
            preset: SpeedPreset::Balanced,
            crf: 23,
            resolution: None,
            bitrate: None,
            temp_dir: None,
            strict: false,
        }
    }

    /// Apply a named quality preset's bundled settings.
    pub fn with_quality(mut self, preset: &QualityPreset) -> Self {
        self.preset = preset.preset;
        self.crf = preset.crf;
        self.resolution = preset.resolution;
        self.bitrate = preset.bitrate.map(str::to_string);
        self
    }

    /// Validate the request. Called before a task is created; invalid
    /// requests never enter the queue.
    pub fn validate(&self) -> Result<()> {
        if self.crf > 51 {
            return Err(Error::validation(format!(
                "crf must be in 0..=51, got {}",
                self.crf
            )));
        }

        if let Some((width, height)) = self.resolution {
            if width == 0 || height == 0 {
                return Err(Error::validation(format!(
                    "resolution dimensions must be positive, got {}x{}",
                    width, height
                )));
            }
            if width % 2 != 0 || height % 2 != 0 {
                return Err(Error::validation(format!(
                    "width and height must be even numbers, got {}x{}",
                    width, height
                )));
            }
            if self.strict && !is_common_aspect_ratio(width, height) {
                return Err(Error::validation(format!(
                    "{}x{} is not a standard video aspect ratio",
                    width, height
                )));
            }
        }

        Ok(())
    }
}

/// True when width:height is close to a common video aspect ratio
/// (16:9, 4:3 or 21:9).
pub fn is_common_aspect_ratio(width: u32, height: u32) -> bool {
    let ratio = width as f64 / height as f64;
    const COMMON: [f64; 3] = [16.0 / 9.0, 4.0 / 3.0, 21.0 / 9.0];
    COMMON.iter().any(|r| (ratio - r).abs() < 0.1)
}

/// A named bundle of compression settings.
#[derive(Debug, Clone, Copy)]
pub struct QualityPreset {
    pub name: &'static str,
    pub resolution: Option<(u32, u32)>,
    pub bitrate: Option<&'static str>,
    pub crf: u8,
    pub preset: SpeedPreset,
}

/// Built-in quality presets, ordered from smallest to largest output.
pub const QUALITY_PRESETS: [QualityPreset; 3] = [
    QualityPreset {
        name: "low",
        resolution: Some((854, 480)),
        bitrate: Some("1M"),
        crf: 28,
        preset: SpeedPreset::Fast,
    },
    QualityPreset {
        name: "medium",
        resolution: Some((1280, 720)),
        bitrate: Some("2M"),
        crf: 23,
        preset: SpeedPreset::Balanced,
    },
    QualityPreset {
        name: "high",
        resolution: Some((1920, 1080)),
        bitrate: Some("4M"),
        crf: 18,
        preset: SpeedPreset::Best,
    },
];

/// Look up a built-in quality preset by name (case-insensitive).
pub fn quality_preset(name: &str) -> Option<&'static QualityPreset> {
    let name = name.to_lowercase();
    QUALITY_PRESETS.iter().find(|p| p.name == name)
}
