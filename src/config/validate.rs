// src/config/validate.rs

use crate::config::model::{
    ArtifactConfig, ControllerConfig, Defaults, RawConfigFile, ReconcilerConfig,
};
use crate::errors::{Result, RundagError};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ReconcilerConfig {
    type Error = crate::errors::RundagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let defaults = Defaults {
            timeout: duration_field("defaults.timeout", &raw.defaults.timeout)?,
            service_account: raw.defaults.service_account.filter(|sa| !sa.is_empty()),
            condition_image: raw.defaults.condition_image,
        };

        let artifacts = ArtifactConfig {
            base_path: raw.artifacts.base_path,
            storage_size: raw.artifacts.storage_size,
            storage_class: raw.artifacts.storage_class,
        };

        let controller = ControllerConfig {
            workers: raw.controller.workers,
            resync_interval: duration_field(
                "controller.resync_interval",
                &raw.controller.resync_interval,
            )?,
            backoff_base: duration_field("controller.backoff_base", &raw.controller.backoff_base)?,
            backoff_max: duration_field("controller.backoff_max", &raw.controller.backoff_max)?,
        };

        let config = ReconcilerConfig {
            defaults,
            artifacts,
            controller,
        };
        validate_config(&config)?;
        Ok(config)
    }
}

fn duration_field(field: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value)
        .map_err(|e| RundagError::ConfigError(format!("[{field}] {e}")))
}

pub fn validate_config(cfg: &ReconcilerConfig) -> Result<()> {
    if cfg.controller.workers == 0 {
        return Err(RundagError::ConfigError(
            "[controller].workers must be >= 1 (got 0)".to_string(),
        ));
    }

    if !cfg.artifacts.base_path.starts_with('/') {
        return Err(RundagError::ConfigError(format!(
            "[artifacts].base_path must be an absolute path (got '{}')",
            cfg.artifacts.base_path
        )));
    }

    if cfg.artifacts.storage_size.trim().is_empty() {
        return Err(RundagError::ConfigError(
            "[artifacts].storage_size must not be empty".to_string(),
        ));
    }

    if cfg.controller.backoff_base > cfg.controller.backoff_max {
        return Err(RundagError::ConfigError(
            "[controller].backoff_base must not exceed backoff_max".to_string(),
        ));
    }

    if cfg.controller.resync_interval.is_zero() {
        return Err(RundagError::ConfigError(
            "[controller].resync_interval must be greater than zero".to_string(),
        ));
    }

    Ok(())
}
