//! Deduplicating work queue.
//!
//! An identity is held at most once in the queue and handed to at most one
//! worker at a time. Adding an identity that is being processed defers it
//! until [`WorkQueue::done`] is called for it.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

use crate::resource::NamespacedName;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<NamespacedName>,
    /// Identities waiting to be processed.
    dirty: HashSet<NamespacedName>,
    /// Identities currently handed out to a worker.
    processing: HashSet<NamespacedName>,
    shutting_down: bool,
}

#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The state is only mutated in short non-panicking sections.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue an identity for processing.
    pub fn add(&self, key: NamespacedName) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Queue an identity after `delay`.
    pub fn add_after(self: &Arc<Self>, key: NamespacedName, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Wait for the next identity. Returns `None` once shut down.
    pub async fn get(&self) -> Option<NamespacedName> {
        loop {
            // Register before inspecting state so a shutdown in between is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Mark an identity as finished, requeueing it if it was added meanwhile.
    pub fn done(&self, key: &NamespacedName) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Number of identities waiting to be handed out.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop handing out work; pending and future [`WorkQueue::get`] calls return `None`.
    pub fn shutdown(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}
