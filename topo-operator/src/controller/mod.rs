//! Controller - drives a reconciler from store events.
//!
//! Events are turned into identities on a [`WorkQueue`]; a pool of workers
//! reconciles them, at most one in flight per identity, and requeues failed
//! identities with per-identity exponential [`Backoff`].

mod backoff;
mod owner;
mod queue;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::reconciler::{Context, Outcome, Reconciler};
use crate::resource::{NamespacedName, Resource};
use crate::store::{ResourceStore, WatchEvent};

pub use backoff::{Backoff, BackoffConfig};
pub use owner::OwnerIndex;
pub use queue::WorkQueue;

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub name: String,
    pub workers: usize,
    /// Deadline applied to each reconcile call.
    pub reconcile_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: "topo-kind-controller".to_string(),
            workers: 4,
            reconcile_timeout: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
        }
    }
}

pub struct Controller {
    config: ControllerConfig,
    reconciler: Arc<dyn Reconciler>,
    queue: Arc<WorkQueue>,
    backoff: Arc<Backoff>,
}

impl Controller {
    pub fn new(config: ControllerConfig, reconciler: Arc<dyn Reconciler>) -> Self {
        let backoff = Arc::new(Backoff::new(config.backoff));
        Self {
            config,
            reconciler,
            queue: Arc::new(WorkQueue::new()),
            backoff,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Request a reconcile of `key`.
    pub fn enqueue(&self, key: NamespacedName) {
        self.queue.add(key);
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    /// Enqueue every resource touched by `events`.
    ///
    /// Every resource in `store` is enqueued once when the watch starts and
    /// again whenever the watch lags behind the store.
    pub fn watch<K: Resource>(
        &self,
        events: broadcast::Receiver<WatchEvent<K>>,
        store: Arc<dyn ResourceStore<K>>,
    ) -> JoinHandle<()> {
        let name = self.config.name.clone();
        let handle = {
            let queue = Arc::clone(&self.queue);
            move |event: WatchEvent<K>| queue.add(event.key())
        };
        let resync = {
            let queue = Arc::clone(&self.queue);
            move |resources: Vec<K>| {
                for resource in resources {
                    queue.add(resource.key());
                }
            }
        };
        tokio::spawn(forward(name, events, store, handle, resync))
    }

    /// Enqueue the owners of every resource touched by `events`.
    ///
    /// The owned resources in `store` are reindexed, and their owners
    /// enqueued, when the watch starts and whenever it lags.
    pub fn watch_owned<C: Resource>(
        &self,
        events: broadcast::Receiver<WatchEvent<C>>,
        store: Arc<dyn ResourceStore<C>>,
        index: Arc<OwnerIndex>,
    ) -> JoinHandle<()> {
        let name = self.config.name.clone();
        let handle = {
            let queue = Arc::clone(&self.queue);
            let index = Arc::clone(&index);
            move |event: WatchEvent<C>| {
                for owner in index.observe(&event) {
                    debug!("{} {} changed, requeueing owner {}", C::KIND, event.key(), owner);
                    queue.add(owner);
                }
            }
        };
        let resync = {
            let queue = Arc::clone(&self.queue);
            move |resources: Vec<C>| {
                for owner in index.resync(resources) {
                    queue.add(owner);
                }
            }
        };
        tokio::spawn(forward(name, events, store, handle, resync))
    }

    /// Run the workers until `cancel` fires, then drain them.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting controller {} with {} workers",
            self.config.name, self.config.workers
        );

        let mut workers = JoinSet::new();
        for id in 0..self.config.workers {
            let worker = Worker {
                id,
                reconciler: Arc::clone(&self.reconciler),
                queue: Arc::clone(&self.queue),
                backoff: Arc::clone(&self.backoff),
                timeout: self.config.reconcile_timeout,
            };
            workers.spawn(worker.run(cancel.clone()));
        }

        cancel.cancelled().await;
        info!("Stopping controller {}", self.config.name);
        self.queue.shutdown();

        while let Some(res) = workers.join_next().await {
            if let Err(e) = res {
                error!("Controller worker failed: {}", e);
            }
        }
        info!("Controller {} stopped", self.config.name);
    }
}

async fn forward<K, F, R>(
    name: String,
    events: broadcast::Receiver<WatchEvent<K>>,
    store: Arc<dyn ResourceStore<K>>,
    mut handle: F,
    mut resync: R,
) where
    K: Resource,
    F: FnMut(WatchEvent<K>) + Send + 'static,
    R: FnMut(Vec<K>) + Send + 'static,
{
    let mut stream = BroadcastStream::new(events);
    relist(&name, store.as_ref(), &mut resync).await;
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => handle(event),
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!("Controller {} missed {} {} events, resyncing", name, n, K::KIND);
                relist(&name, store.as_ref(), &mut resync).await;
            }
        }
    }
    debug!("Event source for controller {} closed", name);
}

async fn relist<K, R>(name: &str, store: &dyn ResourceStore<K>, resync: &mut R)
where
    K: Resource,
    R: FnMut(Vec<K>),
{
    match store.list().await {
        Ok(resources) => {
            debug!("Controller {} resyncing {} {}s", name, resources.len(), K::KIND);
            resync(resources);
        }
        Err(e) => error!("Controller {} failed to list {}s: {}", name, K::KIND, e),
    }
}

struct Worker {
    id: usize,
    reconciler: Arc<dyn Reconciler>,
    queue: Arc<WorkQueue>,
    backoff: Arc<Backoff>,
    timeout: Duration,
}

impl Worker {
    async fn run(self, cancel: CancellationToken) {
        debug!("Worker {} started", self.id);
        while let Some(key) = self.queue.get().await {
            let ctx = Context::new(cancel.clone()).with_timeout(self.timeout);
            let outcome = self.reconciler.reconcile(&key, &ctx).await;
            self.handle_outcome(&key, outcome);
            self.queue.done(&key);
        }
        debug!("Worker {} stopped", self.id);
    }

    fn handle_outcome(&self, key: &NamespacedName, outcome: Outcome) {
        match outcome {
            Outcome::Done => self.backoff.forget(key),
            Outcome::Requeue(e) if !e.is_retryable() => {
                error!("Dropping {}: {}", key, e);
                self.backoff.forget(key);
            }
            Outcome::Requeue(e) => {
                let delay = self.backoff.next_delay(key);
                warn!("Requeueing {} in {:?}: {}", key, delay, e);
                self.queue.add_after(key.clone(), delay);
            }
        }
    }
}
