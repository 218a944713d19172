mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load settings from a TOML file
pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {:?}", path))?;

    let settings: Settings = toml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {:?}", path))?;

    validate_settings(&settings)?;

    Ok(settings)
}

/// Load settings from default locations or return defaults
pub fn load_settings_or_default(custom_path: Option<&Path>) -> Result<Settings> {
    if let Some(path) = custom_path {
        return load_settings(path);
    }

    // Try default locations
    let default_paths = [
        "./vidpress.toml",
        "~/.config/vidpress/config.toml",
        "/etc/vidpress/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_settings(path);
        }
    }

    Ok(Settings::default())
}

/// Validate settings once at the boundary; consumers assume a valid value.
fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.max_concurrent_tasks == 0 {
        anyhow::bail!("max_concurrent_tasks must be at least 1");
    }

    match settings.logging.level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        other => anyhow::bail!("Unknown log level: {}", other),
    }

    if let Some(ref dir) = settings.output_directory {
        if !dir.exists() {
            tracing::warn!("Output directory does not exist: {:?}", dir);
        }
    }

    if settings.ffmpeg.codec.is_empty() {
        anyhow::bail!("ffmpeg.codec cannot be empty");
    }

    Ok(())
}
