//! Events emitted by the store on every write.

use crate::resource::{NamespacedName, Resource};

/// A change to a stored resource.
#[derive(Debug, Clone)]
pub enum WatchEvent<K> {
    /// The resource was created or updated; carries the new state.
    Applied(K),
    /// The resource was erased; carries its last state.
    Deleted(K),
}

impl<K: Resource> WatchEvent<K> {
    pub fn resource(&self) -> &K {
        match self {
            Self::Applied(r) | Self::Deleted(r) => r,
        }
    }

    pub fn key(&self) -> NamespacedName {
        self.resource().key()
    }
}
