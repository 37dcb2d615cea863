//! Clients for the onos-topo registry.
//!
//! The reconciler only sees the [`TopoRegistry`] and [`RegistryConnector`]
//! traits; [`topo`] provides the gRPC implementation.

pub mod topo;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{classify, ErrorKind};
use crate::proto::topo::Object;

pub use topo::{GrpcConnector, GrpcTopoClient};

/// Errors returned by registry calls.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("topo object {0} not found")]
    NotFound(String),

    #[error("topo object {0} already exists")]
    AlreadyExists(String),

    #[error("topo request failed: {0}")]
    Unknown(String),

    #[error("topo request cancelled: {0}")]
    Cancelled(String),

    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
}

impl RegistryError {
    /// Build a registry error for `id` from a gRPC status.
    pub fn from_status(id: &str, status: tonic::Status) -> Self {
        match classify(&status) {
            ErrorKind::NotFoundRemote => Self::NotFound(id.to_string()),
            ErrorKind::AlreadyExistsRemote => Self::AlreadyExists(id.to_string()),
            ErrorKind::Cancelled => Self::Cancelled(status.to_string()),
            ErrorKind::TransientRemote
            | ErrorKind::PersistenceConflict
            | ErrorKind::MalformedIdentity => Self::Unknown(status.to_string()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFoundRemote,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExistsRemote,
            Self::Unknown(_) | Self::Connect { .. } => ErrorKind::TransientRemote,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}

/// A live handle to the topology registry.
#[async_trait]
pub trait TopoRegistry: Send + Sync {
    /// Get an object by id.
    async fn get(&self, id: &str) -> Result<Object, RegistryError>;

    /// Create an object.
    async fn create(&self, object: Object) -> Result<(), RegistryError>;

    /// Delete an object by id.
    async fn delete(&self, id: &str) -> Result<(), RegistryError>;
}

/// Acquires a registry handle for the namespace a resource lives in.
///
/// A handle is acquired per reconcile and dropped when the reconcile ends.
#[async_trait]
pub trait RegistryConnector: Send + Sync {
    async fn connect(&self, namespace: &str) -> Result<Box<dyn TopoRegistry>, RegistryError>;
}
