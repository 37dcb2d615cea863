//! Registry of resource types known to the operator.
//!
//! A [`Scheme`] is built once at startup and shared read-only; nothing can be
//! registered after [`SchemeBuilder::build`].

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::resource::Resource;

/// `apiVersion` + `kind` pair identifying a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersionKind {
    pub api_version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn of<R: Resource>() -> Self {
        Self {
            api_version: R::API_VERSION.to_string(),
            kind: R::KIND.to_string(),
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version, self.kind)
    }
}

/// Metadata recorded for a registered type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub gvk: GroupVersionKind,
    /// Rust type backing the resource.
    pub type_name: &'static str,
}

#[derive(Debug, Error)]
pub enum SchemeError {
    #[error("no type registered for {0}")]
    Unregistered(GroupVersionKind),
}

#[derive(Debug, Default)]
pub struct SchemeBuilder {
    types: HashMap<GroupVersionKind, TypeInfo>,
}

impl SchemeBuilder {
    pub fn register<R: Resource>(mut self) -> Self {
        let gvk = GroupVersionKind::of::<R>();
        self.types.entry(gvk.clone()).or_insert(TypeInfo {
            gvk,
            type_name: std::any::type_name::<R>(),
        });
        self
    }

    pub fn build(self) -> Scheme {
        Scheme { types: self.types }
    }
}

/// Frozen type registry.
#[derive(Debug)]
pub struct Scheme {
    types: HashMap<GroupVersionKind, TypeInfo>,
}

impl Scheme {
    pub fn builder() -> SchemeBuilder {
        SchemeBuilder::default()
    }

    /// Look up a type by its manifest header.
    pub fn lookup(&self, api_version: &str, kind: &str) -> Option<&TypeInfo> {
        self.types.get(&GroupVersionKind {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        })
    }

    /// Type info for `R`, failing if it was never registered.
    pub fn require<R: Resource>(&self) -> Result<&TypeInfo, SchemeError> {
        let gvk = GroupVersionKind::of::<R>();
        self.types
            .get(&gvk)
            .ok_or(SchemeError::Unregistered(gvk))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
