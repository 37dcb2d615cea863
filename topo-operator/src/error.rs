//! Error classification for reconciles.

use std::fmt;

use thiserror::Error;
use tonic::Code;

use crate::clients::RegistryError;
use crate::store::StoreError;

/// Domain classification of every failure the reconciler can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The registry has no object with the requested id.
    NotFoundRemote,
    /// The registry already holds an object with the requested id.
    AlreadyExistsRemote,
    /// Network, server or otherwise unknown registry failure.
    TransientRemote,
    /// The local resource could not be persisted.
    PersistenceConflict,
    /// The request identity cannot name a resource.
    MalformedIdentity,
    /// The caller cancelled the reconcile or its deadline passed.
    Cancelled,
}

/// Map a gRPC status to an [`ErrorKind`].
///
/// Every code is listed so that adding a code to tonic breaks the build
/// instead of silently classifying it.
pub fn classify(status: &tonic::Status) -> ErrorKind {
    match status.code() {
        Code::NotFound => ErrorKind::NotFoundRemote,
        Code::AlreadyExists => ErrorKind::AlreadyExistsRemote,
        Code::Cancelled | Code::DeadlineExceeded => ErrorKind::Cancelled,
        Code::Ok
        | Code::Unknown
        | Code::InvalidArgument
        | Code::PermissionDenied
        | Code::ResourceExhausted
        | Code::FailedPrecondition
        | Code::Aborted
        | Code::OutOfRange
        | Code::Unimplemented
        | Code::Internal
        | Code::Unavailable
        | Code::DataLoss
        | Code::Unauthenticated => ErrorKind::TransientRemote,
    }
}

/// Errors that end a reconcile with a requeue.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("malformed identity {key:?}: {reason}")]
    MalformedIdentity { key: String, reason: &'static str },

    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("reconcile cancelled")]
    Cancelled,

    #[error("reconcile deadline exceeded")]
    DeadlineExceeded,
}

impl ReconcileError {
    pub fn malformed(key: impl fmt::Display, reason: &'static str) -> Self {
        Self::MalformedIdentity {
            key: key.to_string(),
            reason,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedIdentity { .. } => ErrorKind::MalformedIdentity,
            Self::Registry(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Cancelled | Self::DeadlineExceeded => ErrorKind::Cancelled,
        }
    }

    /// Whether redelivering the same identity can succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() != ErrorKind::MalformedIdentity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Status;

    #[test]
    fn test_classify_idempotency_codes() {
        assert_eq!(
            classify(&Status::not_found("kind")),
            ErrorKind::NotFoundRemote
        );
        assert_eq!(
            classify(&Status::already_exists("kind")),
            ErrorKind::AlreadyExistsRemote
        );
    }

    #[test]
    fn test_classify_everything_else_is_not_recoverable_locally() {
        let codes = [
            Code::Ok,
            Code::Unknown,
            Code::InvalidArgument,
            Code::PermissionDenied,
            Code::ResourceExhausted,
            Code::FailedPrecondition,
            Code::Aborted,
            Code::OutOfRange,
            Code::Unimplemented,
            Code::Internal,
            Code::Unavailable,
            Code::DataLoss,
            Code::Unauthenticated,
        ];
        for code in codes {
            assert_eq!(
                classify(&Status::new(code, "boom")),
                ErrorKind::TransientRemote,
                "{code:?}"
            );
        }
        assert_eq!(
            classify(&Status::deadline_exceeded("slow")),
            ErrorKind::Cancelled
        );
    }

    #[test]
    fn test_only_malformed_identity_is_terminal() {
        assert!(!ReconcileError::malformed("x", "bad").is_retryable());
        assert!(ReconcileError::Cancelled.is_retryable());
        assert!(ReconcileError::from(RegistryError::Unknown("down".into())).is_retryable());
    }
}
