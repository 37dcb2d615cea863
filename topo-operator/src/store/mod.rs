//! Resource store abstraction.
//!
//! The reconciler reads and persists resources through [`ResourceStore`];
//! [`MemoryStore`] is the in-process implementation.

mod error;
mod event;
mod memory;

use async_trait::async_trait;

use crate::resource::{NamespacedName, Resource};

pub use error::{Result, StoreError};
pub use event::WatchEvent;
pub use memory::MemoryStore;

/// Read and optimistic-update access to stored resources.
#[async_trait]
pub trait ResourceStore<K: Resource>: Send + Sync {
    /// Get a resource, `None` if it does not exist.
    async fn get(&self, key: &NamespacedName) -> Result<Option<K>>;

    /// List every stored resource.
    async fn list(&self) -> Result<Vec<K>>;

    /// Replace a resource. Fails with [`StoreError::Conflict`] if the
    /// resource version is stale.
    async fn update(&self, resource: &K) -> Result<K>;
}
