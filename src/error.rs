//! Error types for the synchronization engine.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the broadside error type.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for the synchronization engine.
///
/// Envelope-level variants (`Transport`, `BatchRejected`, `EnvelopeMismatch`) fail a whole
/// batch envelope. Inside the fan-out executor every variant is caught per item and turned
/// into a failed outcome, so none of them escape a fan-out call.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network-level failure (connection refused, reset, client-side timeout)
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered the batch call itself with a non-success status
    #[error("Batch request rejected with status {status}: {body}")]
    BatchRejected { status: u16, body: String },

    /// The provider answered a single (non-batch) call with a non-success status
    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    /// The batch response did not carry one sub-response per sub-request
    #[error("Batch response carried {actual} sub-responses, expected {expected}")]
    EnvelopeMismatch { expected: usize, actual: usize },

    /// Invalid configuration passed to the coalescer or the executor
    #[error("Validation error: {0}")]
    Validation(String),

    /// An operation did not settle within its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Whether this error was produced by a deadline firing, either ours or the HTTP client's.
    pub fn is_timeout(&self) -> bool {
        match self {
            SyncError::Timeout(_) => true,
            SyncError::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Low-cardinality label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Transport(_) => "transport",
            SyncError::BatchRejected { .. } => "batch_rejected",
            SyncError::RequestFailed { .. } => "request_failed",
            SyncError::EnvelopeMismatch { .. } => "envelope_mismatch",
            SyncError::Validation(_) => "validation",
            SyncError::Timeout(_) => "timeout",
            SyncError::Serialization(_) => "serialization",
            SyncError::Other(_) => "other",
        }
    }
}
