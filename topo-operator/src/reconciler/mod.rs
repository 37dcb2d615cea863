//! Reconcilers for topology resources.
//!
//! A reconciler observes one resource, performs at most one step towards
//! convergence and reports an [`Outcome`] to the controller driving it.

pub mod kind;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ReconcileError;
use crate::finalizer::has_finalizer;
use crate::resource::{NamespacedName, Resource};

pub use kind::KindReconciler;

/// Result of one reconcile pass.
#[derive(Debug)]
pub enum Outcome {
    /// Converged for this pass, nothing scheduled.
    Done,
    /// Redeliver the identity later.
    Requeue(ReconcileError),
}

impl Outcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Lifecycle state derived from a resource snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ActiveNoFinalizer,
    ActiveFinalized,
    DeletingFinalized,
    /// Terminal; the store erases the resource once other finalizers clear.
    DeletingNoFinalizer,
}

impl State {
    pub fn observe<R: Resource>(resource: &R, token: &str) -> Self {
        match (resource.is_deleting(), has_finalizer(resource, token)) {
            (false, false) => Self::ActiveNoFinalizer,
            (false, true) => Self::ActiveFinalized,
            (true, true) => Self::DeletingFinalized,
            (true, false) => Self::DeletingNoFinalizer,
        }
    }
}

/// Cancellation and deadline of the caller, applied to every blocking call.
#[derive(Debug, Clone)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::new(CancellationToken::new())
    }

    /// Derive a context that also expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `fut` unless the context is cancelled or expires first, in which
    /// case `fut` is dropped.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ReconcileError> {
        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .map_err(|_| ReconcileError::DeadlineExceeded),
                None => Ok(fut.await),
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReconcileError::Cancelled),
            res = bounded => res,
        }
    }
}

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Observe the resource named by `key` and take at most one step.
    async fn reconcile(&self, key: &NamespacedName, ctx: &Context) -> Outcome;
}
