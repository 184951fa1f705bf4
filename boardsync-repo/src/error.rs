//! Error types for boardsync-repo.

use thiserror::Error;

/// Errors that can occur while driving the version-control tree.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("git not installed or not in PATH")]
    GitNotFound,

    #[error("git command failed: {message}")]
    CommandFailed { message: String },

    #[error("nothing staged to commit")]
    NothingToCommit,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
