// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Transform failed for {path:?}: {message}")]
    TransformError { path: PathBuf, message: String },

    #[error("Failed to launch process: {0}")]
    LaunchError(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MirrorError {
    /// Shorthand used by transformers to report a per-file failure.
    pub fn transform(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        MirrorError::TransformError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for errors that only mean "the file is already gone".
    pub fn is_not_found(&self) -> bool {
        match self {
            MirrorError::IoError(err) => err.kind() == std::io::ErrorKind::NotFound,
            MirrorError::Other(err) => err
                .chain()
                .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
                .any(|io| io.kind() == std::io::ErrorKind::NotFound),
            _ => false,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, MirrorError>;
