//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use topo_operator::clients::{RegistryConnector, RegistryError, TopoRegistry};
use topo_operator::proto::topo::Object;
use topo_operator::store::{MemoryStore, ResourceStore, StoreError};
use topo_operator::{Kind, NamespacedName, Resource};

pub const FINALIZER: &str = "topo";

/// Registry operations, for call recording and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Connect,
    Get,
    Create,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(String),
    Get(String),
    Create(String),
    Delete(String),
}

/// Error to return from the next call of an [`Op`].
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    NotFound,
    AlreadyExists,
    Unknown,
    Hang,
}

#[derive(Default)]
struct State {
    objects: HashMap<String, Object>,
    calls: Vec<Call>,
    faults: HashMap<Op, VecDeque<Fault>>,
}

/// In-memory topology registry that records every call.
#[derive(Clone, Default)]
pub struct FakeRegistry {
    state: Arc<Mutex<State>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    /// Insert an object directly, as another actor would.
    pub fn insert(&self, object: Object) {
        self.with(|s| s.objects.insert(object.id.clone(), object));
    }

    /// Remove an object directly, as another actor would.
    pub fn remove(&self, id: &str) {
        self.with(|s| s.objects.remove(id));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.with(|s| s.objects.contains_key(id))
    }

    pub fn object(&self, id: &str) -> Option<Object> {
        self.with(|s| s.objects.get(id).cloned())
    }

    pub fn len(&self) -> usize {
        self.with(|s| s.objects.len())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls()
            .iter()
            .filter(|c| {
                matches!(
                    (c, op),
                    (Call::Connect(_), Op::Connect)
                        | (Call::Get(_), Op::Get)
                        | (Call::Create(_), Op::Create)
                        | (Call::Delete(_), Op::Delete)
                )
            })
            .count()
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    /// Make the next call of `op` fail with `fault`.
    pub fn inject(&self, op: Op, fault: Fault) {
        self.with(|s| s.faults.entry(op).or_default().push_back(fault));
    }

    async fn begin(&self, op: Op, call: Call, id: &str) -> Result<(), RegistryError> {
        let fault = self.with(|s| {
            s.calls.push(call);
            s.faults.get_mut(&op).and_then(VecDeque::pop_front)
        });
        match fault {
            None => Ok(()),
            Some(Fault::NotFound) => Err(RegistryError::NotFound(id.to_string())),
            Some(Fault::AlreadyExists) => Err(RegistryError::AlreadyExists(id.to_string())),
            Some(Fault::Unknown) => Err(RegistryError::Unknown("injected".to_string())),
            Some(Fault::Hang) => std::future::pending().await,
        }
    }
}

#[async_trait]
impl TopoRegistry for FakeRegistry {
    async fn get(&self, id: &str) -> Result<Object, RegistryError> {
        self.begin(Op::Get, Call::Get(id.to_string()), id).await?;
        self.with(|s| s.objects.get(id).cloned())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    async fn create(&self, object: Object) -> Result<(), RegistryError> {
        let id = object.id.clone();
        self.begin(Op::Create, Call::Create(id.clone()), &id).await?;
        self.with(|s| {
            if s.objects.contains_key(&id) {
                return Err(RegistryError::AlreadyExists(id.clone()));
            }
            s.objects.insert(id.clone(), object);
            Ok(())
        })
    }

    async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        self.begin(Op::Delete, Call::Delete(id.to_string()), id).await?;
        self.with(|s| s.objects.remove(id))
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl RegistryConnector for FakeRegistry {
    async fn connect(&self, namespace: &str) -> Result<Box<dyn TopoRegistry>, RegistryError> {
        self.begin(Op::Connect, Call::Connect(namespace.to_string()), namespace)
            .await?;
        Ok(Box::new(self.clone()))
    }
}

/// Store wrapper that counts updates and can fail them.
pub struct FaultyStore {
    inner: Arc<MemoryStore<Kind>>,
    fail_updates: AtomicU32,
    updates: AtomicU32,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore<Kind>>) -> Self {
        Self {
            inner,
            fail_updates: AtomicU32::new(0),
            updates: AtomicU32::new(0),
        }
    }

    /// Fail the next `n` updates with a version conflict.
    pub fn fail_updates(&self, n: u32) {
        self.fail_updates.store(n, Ordering::SeqCst);
    }

    /// Number of successful updates.
    pub fn updates(&self) -> u32 {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceStore<Kind> for FaultyStore {
    async fn get(&self, key: &NamespacedName) -> Result<Option<Kind>, StoreError> {
        self.inner.get(key).await
    }

    async fn list(&self) -> Result<Vec<Kind>, StoreError> {
        self.inner.list().await
    }

    async fn update(&self, resource: &Kind) -> Result<Kind, StoreError> {
        let failing = self
            .fail_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Conflict {
                key: resource.key().to_string(),
                expected: resource.metadata.resource_version + 1,
                actual: resource.metadata.resource_version,
            });
        }
        let updated = self.inner.update(resource).await?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}

pub fn kind(name: &str) -> Kind {
    let attributes = BTreeMap::from([("vendor".to_string(), "acme".to_string())]);
    Kind::new("onos", name, attributes)
}

pub fn key(name: &str) -> NamespacedName {
    NamespacedName::new("onos", name)
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
