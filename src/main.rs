mod cli;

use vidpress::{
    config,
    events::AppEvent,
    manager::CompressionManager,
    probe,
    request::{quality_preset, CompressionRequest},
    tools::ToolRegistry,
};

use anyhow::Result;
use clap::Parser;
use cli::{parse_resolution, Cli, Commands};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = config::load_settings_or_default(cli.config.as_deref())?;

    // Respect RUST_LOG env var if set, otherwise use the verbose flag or the
    // configured level.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vidpress=trace".to_string()
        } else if settings.logging.enabled {
            format!("vidpress={}", settings.logging.level)
        } else {
            "off".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Compress {
            inputs,
            output_dir,
            quality,
            crf,
            preset,
            resolution,
            bitrate,
            jobs,
            strict,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(compress(
                settings,
                inputs,
                output_dir,
                quality,
                crf,
                preset,
                resolution,
                bitrate,
                jobs,
                strict,
            ))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&settings, &file, json))
        }
        Commands::CheckTools => check_tools(&settings),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vidpress {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn compress(
    mut settings: config::Settings,
    inputs: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    quality: Option<String>,
    crf: Option<u8>,
    preset: Option<String>,
    resolution: Option<String>,
    bitrate: Option<String>,
    jobs: Option<usize>,
    strict: bool,
) -> Result<()> {
    if let Some(jobs) = jobs {
        if jobs == 0 {
            anyhow::bail!("--jobs must be at least 1");
        }
        settings.max_concurrent_tasks = jobs;
    }
    let output_dir = output_dir.or_else(|| settings.output_directory.clone());

    let registry = ToolRegistry::discover(&settings.tools);
    registry.require("ffmpeg")?;
    registry.require("ffprobe")?;

    let manager = CompressionManager::new(settings.clone(), registry);
    let mut events = manager.subscribe();

    for input in &inputs {
        if !input.exists() {
            anyhow::bail!("Input file does not exist: {:?}", input);
        }

        let mut request = CompressionRequest::new(input.clone(), output_path(input, output_dir.as_deref()));
        request.codec = settings.ffmpeg.codec.clone();
        request.temp_dir = settings.temp_directory.clone();
        request.strict = strict;

        if let Some(ref name) = quality {
            let preset = quality_preset(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown quality preset: {}", name))?;
            request = request.with_quality(preset);
        }
        if let Some(crf) = crf {
            request.crf = crf;
        }
        if let Some(ref preset) = preset {
            request.preset = preset.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        }
        if let Some(ref resolution) = resolution {
            request.resolution = Some(parse_resolution(resolution)?);
        }
        if let Some(ref bitrate) = bitrate {
            request.bitrate = Some(bitrate.clone());
        }

        let id = manager
            .submit(request)
            .map_err(|e| anyhow::anyhow!("{}: {}", input.display(), e))?;
        tracing::debug!(%id, input = %input.display(), "submitted");
    }

    // Drive the batch to completion off the event stream.
    let mut failures = 0usize;
    loop {
        match events.recv().await {
            Ok(AppEvent::TaskStarted { file_name, .. }) => {
                println!("Started: {file_name}");
            }
            Ok(AppEvent::TaskProgress { status, .. }) => {
                println!("{status}");
            }
            Ok(AppEvent::TaskCompleted { message, .. }) => {
                println!("{message}");
            }
            Ok(AppEvent::TaskFailed { error, .. }) => {
                failures += 1;
                eprintln!("Failed: {error}");
            }
            Ok(AppEvent::TaskCancelled { .. }) => {
                println!("Cancelled");
            }
            Ok(AppEvent::AllComplete) => break,
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("event stream lagged, skipped {skipped} events");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    let stats = manager.stats();
    println!(
        "All tasks finished: {} completed, {} failed, {} cancelled",
        stats.completed, stats.failed, stats.cancelled
    );

    if failures > 0 {
        anyhow::bail!("{failures} task(s) failed");
    }
    Ok(())
}

/// `<dir>/<stem>_compressed.<ext>`, next to the input when no directory is
/// configured.
fn output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "mp4".to_string());

    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    dir.join(format!("{stem}_compressed.{ext}"))
}

async fn probe_file(settings: &config::Settings, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let registry = ToolRegistry::discover(&settings.tools);
    let ffprobe = registry.require("ffprobe")?;
    let info = probe::probe_video(ffprobe, file).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "width": info.width,
                "height": info.height,
                "duration_secs": info.duration_secs,
                "frame_count": info.frame_count,
                "file_size": info.file_size,
            })
        );
    } else {
        println!("File: {}", file.display());
        println!("Resolution: {}x{}", info.width, info.height);
        println!(
            "Duration: {}",
            vidpress::progress::format_duration(info.duration_secs as u64)
        );
        println!("Frames: {}", info.frame_count);
        println!("Size: {} bytes", info.file_size);
    }

    Ok(())
}

fn check_tools(settings: &config::Settings) -> Result<()> {
    let registry = ToolRegistry::discover(&settings.tools);
    let mut all_available = true;

    println!("Checking external tools...\n");
    for info in registry.check_all() {
        if info.available {
            println!(
                "  [OK] {} - {}",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
            if let Some(ref path) = info.path {
                println!("       {}", path.display());
            }
        } else {
            all_available = false;
            println!("  [MISSING] {}", info.name);
        }
    }

    if !all_available {
        anyhow::bail!("Some required tools are missing");
    }
    println!("\nAll tools available.");
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let settings = config::load_settings_or_default(path)?;
    println!("Configuration is valid.");
    println!("  max_concurrent_tasks: {}", settings.max_concurrent_tasks);
    println!("  codec: {}", settings.ffmpeg.codec);
    if let Some(ref dir) = settings.output_directory {
        println!("  output_directory: {}", dir.display());
    }
    Ok(())
}
