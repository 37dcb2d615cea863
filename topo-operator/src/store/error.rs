//! Store error types.

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Version mismatch (optimistic concurrency control).
    #[error("conflict on {key}: expected version {expected}, got {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// Backend failure.
    #[error("internal: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::AlreadyExists(_) | Self::Conflict { .. } => {
                ErrorKind::PersistenceConflict
            }
            Self::Internal(_) => ErrorKind::TransientRemote,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
