//! Error types for boardsync-engine.

use std::path::PathBuf;

use thiserror::Error;

use boardsync_core::CoreError;
use boardsync_repo::RepoError;
use boardsync_store::StoreError;

/// Top-level reconciliation errors. Per-entity failures (malformed bodies,
/// version conflicts) are logged and skipped inside the reconcilers; what
/// reaches this type aborts the run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("codec/baseline error: {0}")]
    Core(#[from] CoreError),

    #[error("definition store error: {0}")]
    Store(#[from] StoreError),

    #[error("repository error: {0}")]
    Repo(#[from] RepoError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`EngineError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.into(),
        source,
    }
}
