mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./splicebox.toml", "~/.config/splicebox/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    let capture = &config.capture;

    for (field, value) in [
        ("video_dir", &capture.video_dir),
        ("audio_dir", &capture.audio_dir),
        ("init_file", &capture.init_file),
        ("fragment_extension", &capture.fragment_extension),
    ] {
        if value.trim().is_empty() {
            anyhow::bail!("capture.{} cannot be empty", field);
        }
    }

    if capture.video_dir == capture.audio_dir {
        anyhow::bail!(
            "capture.video_dir and capture.audio_dir must differ (both are '{}')",
            capture.video_dir
        );
    }

    if capture.fragment_extension.starts_with('.') {
        anyhow::bail!(
            "capture.fragment_extension should not start with a dot: '{}'",
            capture.fragment_extension
        );
    }

    if config.output.suffix.is_empty() {
        anyhow::bail!("output.suffix cannot be empty");
    }

    if let Some(dir) = &config.output.directory {
        if !dir.exists() {
            tracing::warn!("Output directory does not exist: {:?}", dir);
        }
    }

    Ok(())
}
