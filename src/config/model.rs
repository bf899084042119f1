// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

/// Configuration as read from a TOML file.
///
/// ```toml
/// [defaults]
/// timeout = "60m"
/// service_account = "builder"
/// condition_image = "busybox"
///
/// [artifacts]
/// base_path = "/pvc"
/// storage_size = "5Gi"
///
/// [controller]
/// workers = 2
/// resync_interval = "30s"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub defaults: RawDefaults,

    #[serde(default)]
    pub artifacts: RawArtifacts,

    #[serde(default)]
    pub controller: RawController,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDefaults {
    /// Timeout applied to runs that do not declare one.
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Service account used when neither the run nor a per-task override sets one.
    #[serde(default)]
    pub service_account: Option<String>,

    /// Image for condition-check steps that do not name one.
    #[serde(default = "default_condition_image")]
    pub condition_image: String,
}

impl Default for RawDefaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            service_account: None,
            condition_image: default_condition_image(),
        }
    }
}

/// `[artifacts]` section: the shared volume used to pass resources between nodes.
#[derive(Debug, Clone, Deserialize)]
pub struct RawArtifacts {
    #[serde(default = "default_base_path")]
    pub base_path: String,

    #[serde(default = "default_storage_size")]
    pub storage_size: String,

    #[serde(default)]
    pub storage_class: Option<String>,
}

impl Default for RawArtifacts {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            storage_size: default_storage_size(),
            storage_class: None,
        }
    }
}

/// `[controller]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawController {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_resync_interval")]
    pub resync_interval: String,

    #[serde(default = "default_backoff_base")]
    pub backoff_base: String,

    #[serde(default = "default_backoff_max")]
    pub backoff_max: String,
}

impl Default for RawController {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            resync_interval: default_resync_interval(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
        }
    }
}

fn default_timeout() -> String {
    "60m".to_string()
}

fn default_condition_image() -> String {
    "busybox".to_string()
}

fn default_base_path() -> String {
    "/pvc".to_string()
}

fn default_storage_size() -> String {
    "5Gi".to_string()
}

fn default_workers() -> usize {
    2
}

fn default_resync_interval() -> String {
    "30s".to_string()
}

fn default_backoff_base() -> String {
    "100ms".to_string()
}

fn default_backoff_max() -> String {
    "30s".to_string()
}

/// Validated configuration handed to the reconciler and controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub defaults: Defaults,
    pub artifacts: ArtifactConfig,
    pub controller: ControllerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub timeout: Duration,
    pub service_account: Option<String>,
    pub condition_image: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactConfig {
    pub base_path: String,
    pub storage_size: String,
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub workers: usize,
    pub resync_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            defaults: Defaults {
                timeout: Duration::from_secs(60 * 60),
                service_account: None,
                condition_image: default_condition_image(),
            },
            artifacts: ArtifactConfig {
                base_path: default_base_path(),
                storage_size: default_storage_size(),
                storage_class: None,
            },
            controller: ControllerConfig {
                workers: default_workers(),
                resync_interval: Duration::from_secs(30),
                backoff_base: Duration::from_millis(100),
                backoff_max: Duration::from_secs(30),
            },
        }
    }
}
