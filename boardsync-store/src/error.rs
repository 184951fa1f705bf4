//! Error types for boardsync-store.

use thiserror::Error;

/// All errors that can arise from definition-store calls.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network-level failure before an HTTP status was received.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The store answered with a non-success status.
    #[error("store returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// A lookup for a specific entity came back 404.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store's response did not have the shape we expect.
    #[error("malformed store response: {reason}")]
    Malformed { reason: String },
}

impl StoreError {
    /// True when the store rejected a write because the recorded version is
    /// stale. Reconciliation skips the entity instead of aborting the run.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, StoreError::Http { status: 412, .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. } | StoreError::Http { status: 404, .. }
        )
    }
}

/// Map a ureq error to [`StoreError`]. Status errors keep the response body
/// for the log line; transport errors keep the cause.
pub(crate) fn request_err(err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(status, response) => StoreError::Http {
            status,
            message: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => StoreError::Transport {
            message: transport.to_string(),
        },
    }
}
