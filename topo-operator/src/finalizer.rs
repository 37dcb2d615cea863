//! Finalizer helpers.
//!
//! These only mutate the in-memory resource; callers persist the result.

use crate::resource::Resource;

/// Whether `token` is among the resource's finalizers.
pub fn has_finalizer<R: Resource>(resource: &R, token: &str) -> bool {
    resource.meta().finalizers.iter().any(|f| f == token)
}

/// Add `token` unless already present.
pub fn add_finalizer<R: Resource>(resource: &mut R, token: &str) {
    if !has_finalizer(resource, token) {
        resource.meta_mut().finalizers.push(token.to_string());
    }
}

/// Remove `token`, leaving other finalizers untouched.
pub fn remove_finalizer<R: Resource>(resource: &mut R, token: &str) {
    resource.meta_mut().finalizers.retain(|f| f != token);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Kind;

    fn kind() -> Kind {
        Kind::new("onos", "switch", Default::default())
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut kind = kind();
        assert!(!has_finalizer(&kind, "topo"));

        add_finalizer(&mut kind, "topo");
        add_finalizer(&mut kind, "topo");
        assert!(has_finalizer(&kind, "topo"));
        assert_eq!(kind.metadata.finalizers, vec!["topo".to_string()]);
    }

    #[test]
    fn test_remove_only_own_token() {
        let mut kind = kind();
        add_finalizer(&mut kind, "config");
        add_finalizer(&mut kind, "topo");

        remove_finalizer(&mut kind, "topo");
        remove_finalizer(&mut kind, "topo");
        assert!(!has_finalizer(&kind, "topo"));
        assert_eq!(kind.metadata.finalizers, vec!["config".to_string()]);
    }
}
