//! topo-operator: keeps topology `Kind` resources mirrored in onos-topo.
//!
//! The crate is split the way the operator runs:
//! - [`reconciler`]: the per-resource state machine (finalizer, create, delete)
//! - [`controller`]: the work queue that drives reconciles with backoff
//! - [`clients`]: the onos-topo registry client and its connector
//! - [`store`]: the resource store the reconciler reads and persists through

pub mod clients;
pub mod config;
pub mod controller;
pub mod error;
pub mod finalizer;
pub mod manifest;
pub mod proto;
pub mod reconciler;
pub mod resource;
pub mod scheme;
pub mod store;

pub use error::{classify, ErrorKind, ReconcileError};
pub use resource::{Kind, KindSpec, NamespacedName, ObjectMeta, OwnerReference, Resource};
