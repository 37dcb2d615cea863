//! Owner index: maps owned resources to the owner that must be requeued
//! when they change.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::resource::{NamespacedName, ObjectMeta, Resource};
use crate::scheme::{GroupVersionKind, Scheme, SchemeError};
use crate::store::WatchEvent;

pub struct OwnerIndex {
    owner: GroupVersionKind,
    owners: Mutex<HashMap<NamespacedName, NamespacedName>>,
}

impl OwnerIndex {
    /// Index for owners of type `O`, which must be registered in `scheme`.
    pub fn new<O: Resource>(scheme: &Scheme) -> Result<Self, SchemeError> {
        let info = scheme.require::<O>()?;
        Ok(Self {
            owner: info.gvk.clone(),
            owners: Mutex::new(HashMap::new()),
        })
    }

    /// The controlling owner of `meta`, if it is of the indexed type.
    fn controller_of(&self, meta: &ObjectMeta) -> Option<NamespacedName> {
        meta.owner_references
            .iter()
            .find(|r| {
                r.controller && r.api_version == self.owner.api_version && r.kind == self.owner.kind
            })
            .map(|r| NamespacedName::new(&meta.namespace, &r.name))
    }

    /// Record a change to an owned resource and return the owners to requeue.
    ///
    /// Both the previous and the current owner are returned when ownership
    /// moved, so neither misses the change.
    pub fn observe<C: Resource>(&self, event: &WatchEvent<C>) -> Vec<NamespacedName> {
        let key = event.key();
        let current = self.controller_of(event.resource().meta());

        let previous = {
            let mut owners = self.owners.lock().unwrap_or_else(|e| e.into_inner());
            match (event, &current) {
                (WatchEvent::Applied(_), Some(owner)) => owners.insert(key, owner.clone()),
                (WatchEvent::Applied(_), None) | (WatchEvent::Deleted(_), _) => {
                    owners.remove(&key)
                }
            }
        };

        let mut requeue = Vec::with_capacity(2);
        requeue.extend(previous);
        if let Some(owner) = current {
            if !requeue.contains(&owner) {
                requeue.push(owner);
            }
        }
        requeue
    }

    /// Rebuild the index from a full listing of owned resources and return
    /// every owner that was or is indexed.
    pub fn resync<C: Resource>(&self, children: Vec<C>) -> Vec<NamespacedName> {
        let rebuilt: HashMap<NamespacedName, NamespacedName> = children
            .iter()
            .filter_map(|c| Some((c.key(), self.controller_of(c.meta())?)))
            .collect();

        let previous = {
            let mut owners = self.owners.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *owners, rebuilt.clone())
        };

        let mut requeue: Vec<NamespacedName> =
            previous.into_values().chain(rebuilt.into_values()).collect();
        requeue.sort();
        requeue.dedup();
        requeue
    }

    pub fn owner_of(&self, child: &NamespacedName) -> Option<NamespacedName> {
        self.owners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(child)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.owners.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Kind, OwnerReference, TOPO_API_VERSION};

    fn child(owner: Option<&str>) -> Kind {
        let mut kind = Kind::new("onos", "child", Default::default());
        if let Some(owner) = owner {
            kind.metadata.owner_references.push(OwnerReference {
                api_version: TOPO_API_VERSION.to_string(),
                kind: "Kind".to_string(),
                name: owner.to_string(),
                uid: String::new(),
                controller: true,
            });
        }
        kind
    }

    fn index() -> OwnerIndex {
        let scheme = Scheme::builder().register::<Kind>().build();
        OwnerIndex::new::<Kind>(&scheme).unwrap()
    }

    #[test]
    fn test_requires_registered_owner() {
        let scheme = Scheme::builder().build();
        assert!(OwnerIndex::new::<Kind>(&scheme).is_err());
    }

    #[test]
    fn test_owner_tracked_and_moved() {
        let index = index();
        let owner_a = NamespacedName::new("onos", "a");
        let owner_b = NamespacedName::new("onos", "b");

        let requeue = index.observe(&WatchEvent::Applied(child(Some("a"))));
        assert_eq!(requeue, vec![owner_a.clone()]);
        assert_eq!(index.owner_of(&NamespacedName::new("onos", "child")), Some(owner_a.clone()));

        let requeue = index.observe(&WatchEvent::Applied(child(Some("b"))));
        assert_eq!(requeue, vec![owner_a, owner_b.clone()]);

        let requeue = index.observe(&WatchEvent::Deleted(child(Some("b"))));
        assert_eq!(requeue, vec![owner_b]);
        assert!(index.is_empty());
    }

    #[test]
    fn test_resync_replaces_index() {
        let index = index();
        index.observe(&WatchEvent::Applied(child(Some("a"))));

        // "child" vanished while the watch lagged; "other" appeared.
        let mut other = child(Some("b"));
        other.metadata.name = "other".to_string();
        let requeue = index.resync(vec![other]);

        assert_eq!(
            requeue,
            vec![NamespacedName::new("onos", "a"), NamespacedName::new("onos", "b")]
        );
        assert_eq!(index.owner_of(&NamespacedName::new("onos", "child")), None);
        assert_eq!(
            index.owner_of(&NamespacedName::new("onos", "other")),
            Some(NamespacedName::new("onos", "b"))
        );
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_non_controller_refs_ignored() {
        let index = index();
        let mut orphan = child(Some("a"));
        orphan.metadata.owner_references[0].controller = false;
        assert!(index.observe(&WatchEvent::Applied(orphan)).is_empty());

        let mut foreign = child(Some("a"));
        foreign.metadata.owner_references[0].kind = "Entity".to_string();
        assert!(index.observe(&WatchEvent::Applied(foreign)).is_empty());
    }
}
