//! Store error types.

use std::path::PathBuf;
use thiserror::Error;

/// Durable store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error while reading or replacing a collection file
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File written by a newer build; refusing to touch it
    #[error("{path} has schema version {found}, this build understands up to {supported}")]
    UnsupportedSchema {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    /// Another process holds the delivery claim on this store
    #[error("{path} is held by another process")]
    Busy { path: PathBuf },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
