use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vidpress")]
#[command(author, version, about = "Batch video compression tool")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compress one or more video files
    Compress {
        /// Input files to compress
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory for compressed output (defaults to each input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Named quality preset: low, medium or high
        #[arg(short, long)]
        quality: Option<String>,

        /// Constant rate factor, 0-51 (lower = higher quality)
        #[arg(long)]
        crf: Option<u8>,

        /// Speed preset: fast, balanced or best
        #[arg(short, long)]
        preset: Option<String>,

        /// Target resolution as WIDTHxHEIGHT (e.g. 1280x720)
        #[arg(short, long)]
        resolution: Option<String>,

        /// Target video bitrate (e.g. 2M)
        #[arg(short, long)]
        bitrate: Option<String>,

        /// Maximum simultaneous encodes (overrides config)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Reject resolutions that are not a standard aspect ratio
        #[arg(long)]
        strict: bool,
    },

    /// Probe a video file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

/// Parse a `WIDTHxHEIGHT` token into a dimension pair.
pub fn parse_resolution(s: &str) -> anyhow::Result<(u32, u32)> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow::anyhow!("Invalid resolution {:?}, expected WIDTHxHEIGHT", s))?;
    let width = w
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid width in resolution {:?}", s))?;
    let height = h
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid height in resolution {:?}", s))?;
    Ok((width, height))
}
