// src/error.rs
//! Error types for the sync library.
//!
//! Adapters and glue code use `anyhow`; the seams callers branch on
//! (store, registry, commit) use these enums.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the durable store, its cursor side-table or the registry file.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend refused the operation (used by test doubles).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Top-level errors surfaced by a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Reading persisted state (window or cursor) failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The batch append failed; nothing was committed for this source.
    #[error("commit abandoned for {channel}: {cause}")]
    CommitAbandoned {
        channel: String,
        #[source]
        cause: StoreError,
    },

    /// The source registry could not be read or written.
    #[error("registry error: {0}")]
    Registry(#[source] StoreError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
