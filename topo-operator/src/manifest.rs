//! Loading resource manifests from JSON.
//!
//! A manifest file holds either a single resource or an array of resources.
//! Every entry must carry an `apiVersion`/`kind` registered in the scheme.
//! [`apply`] makes a store hold exactly the resources of a manifest.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::resource::{NamespacedName, Resource, TypeMeta};
use crate::scheme::{GroupVersionKind, Scheme};
use crate::store::{MemoryStore, ResourceStore, StoreError};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid manifest entry {index}: {source}")]
    Parse {
        index: usize,
        source: serde_json::Error,
    },

    #[error("manifest entry {index}: unregistered type {gvk}")]
    Unregistered { index: usize, gvk: GroupVersionKind },

    #[error("manifest entry {index}: expected {expected}, found {found}")]
    UnexpectedType {
        index: usize,
        expected: GroupVersionKind,
        found: GroupVersionKind,
    },
}

/// Read and decode all resources of type `R` from `path`.
pub fn load<R>(path: &Path, scheme: &Scheme) -> Result<Vec<R>, ManifestError>
where
    R: Resource + DeserializeOwned,
{
    let data = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&data, scheme)
}

/// Decode all resources of type `R` from a JSON document.
pub fn parse<R>(data: &str, scheme: &Scheme) -> Result<Vec<R>, ManifestError>
where
    R: Resource + DeserializeOwned,
{
    let document: Value =
        serde_json::from_str(data).map_err(|source| ManifestError::Parse { index: 0, source })?;
    let entries = match document {
        Value::Array(entries) => entries,
        single => vec![single],
    };

    let expected = GroupVersionKind::of::<R>();
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let type_meta: TypeMeta = serde_json::from_value(entry.clone())
                .map_err(|source| ManifestError::Parse { index, source })?;
            let found = GroupVersionKind {
                api_version: type_meta.api_version,
                kind: type_meta.kind,
            };
            if scheme.lookup(&found.api_version, &found.kind).is_none() {
                return Err(ManifestError::Unregistered { index, gvk: found });
            }
            if found != expected {
                return Err(ManifestError::UnexpectedType {
                    index,
                    expected: expected.clone(),
                    found,
                });
            }
            serde_json::from_value(entry).map_err(|source| ManifestError::Parse { index, source })
        })
        .collect()
}

/// Changes made by [`apply`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplySummary {
    pub created: usize,
    pub deleted: usize,
}

/// Create the resources of `desired` missing from `store` and request
/// deletion of stored resources `desired` no longer lists.
///
/// Resources already stored are left untouched. A listed resource that is
/// still being deleted is created again once the store has erased it.
pub async fn apply<R: Resource>(
    store: &MemoryStore<R>,
    desired: Vec<R>,
) -> Result<ApplySummary, StoreError> {
    let mut summary = ApplySummary::default();
    let wanted: HashSet<NamespacedName> = desired.iter().map(R::key).collect();

    for resource in store.list().await? {
        let key = resource.key();
        if wanted.contains(&key) || resource.is_deleting() {
            continue;
        }
        match store.delete(&key).await {
            Ok(()) => {
                info!("{} {} removed from manifest, deleting", R::KIND, key);
                summary.deleted += 1;
            }
            // Erased concurrently.
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    for resource in desired {
        let key = resource.key();
        if store.get(&key).await?.is_some() {
            continue;
        }
        match store.create(resource).await {
            Ok(_) => {
                debug!("{} {} created from manifest", R::KIND, key);
                summary.created += 1;
            }
            Err(StoreError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Kind;
    use std::io::Write;

    fn scheme() -> Scheme {
        Scheme::builder().register::<Kind>().build()
    }

    #[test]
    fn test_load_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"apiVersion": "topo.onosproject.org/v1beta1", "kind": "Kind",
                  "metadata": {{"name": "switch", "namespace": "onos"}},
                  "spec": {{"attributes": {{"vendor": "acme"}}}}}},
                {{"apiVersion": "topo.onosproject.org/v1beta1", "kind": "Kind",
                  "metadata": {{"name": "link", "namespace": "onos"}}}}
            ]"#
        )
        .unwrap();

        let kinds: Vec<Kind> = load(file.path(), &scheme()).unwrap();
        assert_eq!(kinds.len(), 2);
        assert_eq!(kinds[0].metadata.name, "switch");
        assert_eq!(kinds[0].spec.attributes["vendor"], "acme");
        assert!(kinds[1].spec.attributes.is_empty());
    }

    #[test]
    fn test_parse_single() {
        let kinds: Vec<Kind> = parse(
            r#"{"apiVersion": "topo.onosproject.org/v1beta1", "kind": "Kind",
                "metadata": {"name": "switch", "namespace": "onos"}}"#,
            &scheme(),
        )
        .unwrap();
        assert_eq!(kinds.len(), 1);
    }

    #[test]
    fn test_rejects_unregistered() {
        let err = parse::<Kind>(
            r#"[{"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "x"}}]"#,
            &scheme(),
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Unregistered { index: 0, .. }));
    }

    fn kind(name: &str) -> Kind {
        Kind::new("onos", name, Default::default())
    }

    #[tokio::test]
    async fn test_apply_creates_and_deletes() {
        let store = MemoryStore::new();
        let summary = apply(&store, vec![kind("switch"), kind("link")]).await.unwrap();
        assert_eq!(summary, ApplySummary { created: 2, deleted: 0 });

        // Reapplying is a no-op.
        let summary = apply(&store, vec![kind("switch"), kind("link")]).await.unwrap();
        assert_eq!(summary, ApplySummary::default());

        let summary = apply(&store, vec![kind("switch")]).await.unwrap();
        assert_eq!(summary, ApplySummary { created: 0, deleted: 1 });
        let link = NamespacedName::new("onos", "link");
        assert!(store.get(&link).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_requests_deletion_of_finalized() {
        let store = MemoryStore::new();
        let mut switch = kind("switch");
        switch.metadata.finalizers.push("topo".to_string());
        store.create(switch).await.unwrap();

        let summary = apply(&store, Vec::new()).await.unwrap();
        assert_eq!(summary.deleted, 1);
        let key = NamespacedName::new("onos", "switch");
        let stored = store.get(&key).await.unwrap().unwrap();
        assert!(stored.is_deleting());

        // Already deleting: not counted again, and not recreated while listed.
        assert_eq!(apply(&store, Vec::new()).await.unwrap(), ApplySummary::default());
        let summary = apply(&store, vec![kind("switch")]).await.unwrap();
        assert_eq!(summary.created, 0);
        assert!(store.get(&key).await.unwrap().unwrap().is_deleting());
    }

    #[test]
    fn test_missing_file() {
        let err = load::<Kind>(Path::new("/nonexistent/kinds.json"), &scheme()).unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }
}
