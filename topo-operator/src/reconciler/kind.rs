//! Kind reconciler - mirrors Kind resources into onos-topo.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::{Context, Outcome, Reconciler, State};
use crate::clients::{RegistryConnector, TopoRegistry};
use crate::error::{ErrorKind, ReconcileError};
use crate::finalizer::{add_finalizer, remove_finalizer};
use crate::proto::topo::{self, object, Object};
use crate::resource::{Kind, NamespacedName};
use crate::store::ResourceStore;

impl From<&Kind> for Object {
    fn from(kind: &Kind) -> Self {
        let attributes: HashMap<String, String> = kind
            .spec
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Object {
            id: kind.metadata.name.clone(),
            revision: 0,
            r#type: object::Type::Kind as i32,
            obj: Some(object::Obj::Kind(topo::Kind {
                name: kind.metadata.name.clone(),
                attributes: attributes.clone(),
            })),
            attributes,
        }
    }
}

/// Kind reconciler that keeps a `KIND` object in onos-topo for every live Kind.
///
/// The topo finalizer guarantees the object is deleted before the Kind can
/// be erased. Each pass performs a single transition so that a crash between
/// adding the finalizer and creating the object is retried from the store.
pub struct KindReconciler {
    store: Arc<dyn ResourceStore<Kind>>,
    connector: Arc<dyn RegistryConnector>,
    finalizer: String,
}

impl KindReconciler {
    pub fn new(
        store: Arc<dyn ResourceStore<Kind>>,
        connector: Arc<dyn RegistryConnector>,
        finalizer: impl Into<String>,
    ) -> Self {
        Self {
            store,
            connector,
            finalizer: finalizer.into(),
        }
    }

    pub fn finalizer(&self) -> &str {
        &self.finalizer
    }

    #[instrument(skip(self, ctx), fields(kind = %key))]
    async fn try_reconcile(&self, key: &NamespacedName, ctx: &Context) -> Result<(), ReconcileError> {
        key.validate()?;

        let Some(kind) = ctx.run(self.store.get(key)).await?? else {
            // Deleted after the request was queued; nothing left to clean up.
            debug!("Kind {} not found, skipping", key);
            return Ok(());
        };

        match State::observe(&kind, &self.finalizer) {
            State::ActiveNoFinalizer => self.add_finalizer(kind, ctx).await,
            State::ActiveFinalized => self.ensure_registered(&kind, ctx).await,
            State::DeletingFinalized => self.finalize(kind, ctx).await,
            State::DeletingNoFinalizer => {
                debug!("Kind {} already finalized", key);
                Ok(())
            }
        }
    }

    async fn add_finalizer(&self, mut kind: Kind, ctx: &Context) -> Result<(), ReconcileError> {
        add_finalizer(&mut kind, &self.finalizer);
        ctx.run(self.store.update(&kind)).await??;
        info!("Added finalizer {} to Kind {}", self.finalizer, kind.metadata.name);
        Ok(())
    }

    async fn ensure_registered(&self, kind: &Kind, ctx: &Context) -> Result<(), ReconcileError> {
        let registry = ctx.run(self.connector.connect(&kind.metadata.namespace)).await??;

        if self.kind_exists(registry.as_ref(), kind, ctx).await? {
            debug!("Kind {} already in topology", kind.metadata.name);
            return Ok(());
        }
        self.create_kind(registry.as_ref(), kind, ctx).await
    }

    async fn finalize(&self, mut kind: Kind, ctx: &Context) -> Result<(), ReconcileError> {
        info!("Finalizing (deleting) Kind {} from topology", kind.metadata.name);
        let registry = ctx.run(self.connector.connect(&kind.metadata.namespace)).await??;
        self.delete_kind(registry.as_ref(), &kind, ctx).await?;
        drop(registry);

        // Only now may the Kind disappear.
        remove_finalizer(&mut kind, &self.finalizer);
        ctx.run(self.store.update(&kind)).await??;
        info!("Removed finalizer {} from Kind {}", self.finalizer, kind.metadata.name);
        Ok(())
    }

    async fn kind_exists(
        &self,
        registry: &dyn TopoRegistry,
        kind: &Kind,
        ctx: &Context,
    ) -> Result<bool, ReconcileError> {
        match ctx.run(registry.get(&kind.metadata.name)).await? {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFoundRemote => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_kind(
        &self,
        registry: &dyn TopoRegistry,
        kind: &Kind,
        ctx: &Context,
    ) -> Result<(), ReconcileError> {
        match ctx.run(registry.create(Object::from(kind))).await? {
            Ok(()) => {
                info!("Kind {} created in topology", kind.metadata.name);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExistsRemote => {
                info!("Kind {} already exists in topology", kind.metadata.name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_kind(
        &self,
        registry: &dyn TopoRegistry,
        kind: &Kind,
        ctx: &Context,
    ) -> Result<(), ReconcileError> {
        match ctx.run(registry.delete(&kind.metadata.name)).await? {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFoundRemote => {
                debug!("Kind {} already gone from topology", kind.metadata.name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Reconciler for KindReconciler {
    async fn reconcile(&self, key: &NamespacedName, ctx: &Context) -> Outcome {
        info!("Reconciling Kind {}", key);
        match self.try_reconcile(key, ctx).await {
            Ok(()) => Outcome::Done,
            Err(e) => {
                warn!("Kind {} reconciliation failed: {}", key, e);
                Outcome::Requeue(e)
            }
        }
    }
}
