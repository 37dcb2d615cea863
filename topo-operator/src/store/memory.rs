//! In-memory resource store with optimistic versioning.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::{Result, ResourceStore, StoreError, WatchEvent};
use crate::resource::{NamespacedName, Resource};

const EVENT_CAPACITY: usize = 1024;

struct Inner<K> {
    objects: BTreeMap<NamespacedName, K>,
    version: u64,
}

/// Stores resources in memory and broadcasts a [`WatchEvent`] for every write.
///
/// Deletion follows finalizer semantics: a resource with finalizers is only
/// marked for deletion and is erased once its last finalizer is removed.
pub struct MemoryStore<K: Resource> {
    inner: RwLock<Inner<K>>,
    events: broadcast::Sender<WatchEvent<K>>,
}

impl<K: Resource> MemoryStore<K> {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CAPACITY)
    }

    /// A store whose watchers lag after `capacity` unread events.
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            inner: RwLock::new(Inner {
                objects: BTreeMap::new(),
                version: 0,
            }),
            events,
        }
    }

    /// Subscribe to changes made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent<K>> {
        self.events.subscribe()
    }

    /// Create a resource, assigning its uid and first version.
    pub async fn create(&self, mut resource: K) -> Result<K> {
        let key = resource.key();
        key.validate()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let mut inner = self.inner.write().await;
        if inner.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        inner.version += 1;
        let meta = resource.meta_mut();
        if meta.uid.is_empty() {
            meta.uid = uuid::Uuid::new_v4().to_string();
        }
        meta.resource_version = inner.version;
        meta.deletion_timestamp = None;

        debug!("Created {} {}", K::KIND, key);
        inner.objects.insert(key, resource.clone());
        let _ = self.events.send(WatchEvent::Applied(resource.clone()));
        Ok(resource)
    }

    /// Request deletion of a resource.
    ///
    /// Resources without finalizers are erased immediately; otherwise the
    /// deletion timestamp is set and the resource stays until its finalizers
    /// are removed through [`ResourceStore::update`].
    pub async fn delete(&self, key: &NamespacedName) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Some(current) = inner.objects.get(key) else {
            return Err(StoreError::NotFound(key.to_string()));
        };

        if current.meta().finalizers.is_empty() {
            if let Some(removed) = inner.objects.remove(key) {
                debug!("Deleted {} {}", K::KIND, key);
                let _ = self.events.send(WatchEvent::Deleted(removed));
            }
            return Ok(());
        }
        if current.is_deleting() {
            return Ok(());
        }

        inner.version += 1;
        let version = inner.version;
        if let Some(resource) = inner.objects.get_mut(key) {
            let meta = resource.meta_mut();
            meta.deletion_timestamp = Some(Utc::now());
            meta.resource_version = version;
            debug!(
                "Marked {} {} for deletion, waiting on finalizers {:?}",
                K::KIND,
                key,
                meta.finalizers
            );
            let _ = self.events.send(WatchEvent::Applied(resource.clone()));
        }
        Ok(())
    }
}

impl<K: Resource> Default for MemoryStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: Resource> ResourceStore<K> for MemoryStore<K> {
    async fn get(&self, key: &NamespacedName) -> Result<Option<K>> {
        Ok(self.inner.read().await.objects.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<K>> {
        Ok(self.inner.read().await.objects.values().cloned().collect())
    }

    async fn update(&self, resource: &K) -> Result<K> {
        let key = resource.key();
        let mut inner = self.inner.write().await;
        let Some(current) = inner.objects.get(&key) else {
            return Err(StoreError::NotFound(key.to_string()));
        };

        let expected = current.meta().resource_version;
        let actual = resource.meta().resource_version;
        if expected != actual {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                actual,
            });
        }

        let mut next = resource.clone();
        {
            // Identity and deletion intent are owned by the store.
            let current = current.meta();
            let meta = next.meta_mut();
            meta.uid = current.uid.clone();
            meta.deletion_timestamp = current.deletion_timestamp;
        }
        inner.version += 1;
        next.meta_mut().resource_version = inner.version;

        if next.is_deleting() && next.meta().finalizers.is_empty() {
            inner.objects.remove(&key);
            debug!("Finalized {} {}, erasing", K::KIND, key);
            let _ = self.events.send(WatchEvent::Deleted(next.clone()));
        } else {
            inner.objects.insert(key, next.clone());
            let _ = self.events.send(WatchEvent::Applied(next.clone()));
        }
        Ok(next)
    }
}
