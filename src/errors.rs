// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::reconciler::ReconcileError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum RundagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RundagError>;
