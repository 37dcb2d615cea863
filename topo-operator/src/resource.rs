//! Resource types reconciled by the operator.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

/// API group/version served for topology resources.
pub const TOPO_API_VERSION: &str = "topo.onosproject.org/v1beta1";

const MAX_NAME_LEN: usize = 253;
const MAX_NAMESPACE_LEN: usize = 63;

/// Identity of a namespaced resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a `namespace/name` string.
    pub fn parse(s: &str) -> Result<Self, ReconcileError> {
        let (namespace, name) = s
            .split_once('/')
            .ok_or_else(|| ReconcileError::malformed(s, "expected namespace/name"))?;
        let key = Self::new(namespace, name);
        key.validate()?;
        Ok(key)
    }

    /// Check the namespace is a DNS-1123 label and the name a DNS-1123 subdomain.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.namespace.len() > MAX_NAMESPACE_LEN {
            return Err(ReconcileError::malformed(self, "namespace too long"));
        }
        if !is_dns_label(&self.namespace, false) {
            return Err(ReconcileError::malformed(self, "invalid namespace"));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(ReconcileError::malformed(self, "name too long"));
        }
        if !is_dns_label(&self.name, true) {
            return Err(ReconcileError::malformed(self, "invalid name"));
        }
        Ok(())
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

fn is_dns_label(s: &str, allow_dots: bool) -> bool {
    let bytes = s.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    alnum(first)
        && alnum(last)
        && bytes
            .iter()
            .all(|b| alnum(b) || *b == b'-' || (allow_dots && *b == b'.'))
}

/// `apiVersion`/`kind` header carried by every manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
}

/// Reference from an owned resource to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub controller: bool,
}

/// Metadata shared by all stored resources.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    /// Bumped by the store on every write; updates must carry the current value.
    pub resource_version: u64,
    /// Set once when deletion is requested, never cleared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

/// A typed resource the store and controller can handle.
pub trait Resource: Clone + Send + Sync + 'static {
    const API_VERSION: &'static str;
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> NamespacedName {
        let meta = self.meta();
        NamespacedName::new(&meta.namespace, &meta.name)
    }

    /// Whether deletion has been requested.
    fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }
}

/// Desired state of a topology kind.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KindSpec {
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// A topology entity kind, mirrored into onos-topo as a `KIND` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kind {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: KindSpec,
}

impl Kind {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        attributes: BTreeMap<String, String>,
    ) -> Self {
        Self {
            type_meta: TypeMeta {
                api_version: Self::API_VERSION.to_string(),
                kind: Self::KIND.to_string(),
            },
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                ..Default::default()
            },
            spec: KindSpec { attributes },
        }
    }
}

impl Resource for Kind {
    const API_VERSION: &'static str = TOPO_API_VERSION;
    const KIND: &'static str = "Kind";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
