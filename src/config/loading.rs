//! Locating and reading `bugler.toml`.
//!
//! The directory is decided once per process: either the `--config` argument
//! or `$XDG_CONFIG_HOME/bugler`. A commented default file is written there the
//! first time [`load`] finds nothing.

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::Config;
use super::validation::validate_config;
use crate::common::constants::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::common::utils::private_path;

// `None` inside means "use the platform default"
static CONFIG_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Record the `--config` directory. Only the first call takes effect; later
/// calls fail.
pub fn set_config_dir(dir: Option<String>) -> Result<()> {
    CONFIG_DIR
        .set(dir.map(PathBuf::from))
        .map_err(|_| anyhow!("Configuration directory already set"))
}

/// The `--config` directory, if one was given.
pub fn get_custom_config_dir() -> Option<PathBuf> {
    CONFIG_DIR.get().cloned().flatten()
}

fn config_dir() -> Result<PathBuf> {
    match get_custom_config_dir() {
        Some(dir) => Ok(dir),
        None => dirs::config_dir()
            .map(|base| base.join(CONFIG_DIR_NAME))
            .context("Could not determine config directory"),
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Directory holding `bugler.toml`; relative dataset paths resolve here.
pub fn get_config_base_dir() -> Result<PathBuf> {
    config_dir()
}

pub fn load() -> Result<Config> {
    let path = get_config_path()?;

    if !path.exists() {
        super::builder::create_default_config(&path)
            .context("Failed to create default config during load")?;
    }

    load_from_path(&path)
        .with_context(|| format!("Failed to load configuration from {}", private_path(&path)))
}

/// Parse and validate the file at `path`. Never writes anything.
pub fn load_from_path(path: &Path) -> Result<Config> {
    let shown = private_path(path);
    let text =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config from {shown}"))?;
    let config = toml::from_str::<Config>(&text)
        .with_context(|| format!("Failed to parse config from {shown}"))?;

    validate_config(&config)?;
    Ok(config)
}
