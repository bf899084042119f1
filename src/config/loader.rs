// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawConfigFile, ReconcilerConfig};
use crate::errors::Result;

/// Parse a TOML config file into its raw, unvalidated form.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path, validate it and convert durations.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ReconcilerConfig> {
    let raw_config = load_from_path(&path)?;
    let config = ReconcilerConfig::try_from(raw_config)?;
    Ok(config)
}

/// Like [`load_and_validate`], but a missing file yields the defaults.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<ReconcilerConfig> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "config file not found, using defaults");
        return ReconcilerConfig::try_from(RawConfigFile::default());
    }
    load_and_validate(path)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("Rundag.toml")
}
