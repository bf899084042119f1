// src/config/mod.rs

//! Reconciler configuration.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate and convert it into the typed [`ReconcilerConfig`] (`validate.rs`).
//!
//! The typed value is immutable and handed to the reconciler and controller
//! constructors; nothing reads configuration from global state.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use validate::validate_config;
pub use model::{
    ArtifactConfig, ControllerConfig, Defaults, RawArtifacts, RawConfigFile, RawController,
    RawDefaults, ReconcilerConfig,
};
