//! Error types for boardsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from codec, baseline, and config operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (baseline save, canonical encode).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Baseline or config parse error on load — the file exists but is not
    /// valid. Never treated as an empty first-run record.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// YAML error while reading the configuration file.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An entity body is missing the fields the codec must read.
    #[error("malformed entity: {reason}")]
    MalformedEntity { reason: String },
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
