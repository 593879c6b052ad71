//! Canonical manifest form and content hashing.
//!
//! Desired and live manifests are compared by a SHA-256 hash computed over a
//! canonicalized form: object keys sorted recursively and server-managed
//! fields removed, so that live-side defaulting and field ordering never
//! manufacture spurious differences.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::manifest::Manifest;

/// Metadata fields maintained by the target environment. They appear on live
/// manifests only and are excluded from hashing.
const SERVER_MANAGED_METADATA: &[&str] = &[
    "uid",
    "resourceVersion",
    "generation",
    "creationTimestamp",
    "managedFields",
];

/// Produces the canonical form of a manifest: server-managed fields stripped
/// and object keys in sorted order at every level.
pub fn canonicalize(manifest: &Manifest) -> Value {
    let mut value = manifest.as_value().clone();
    if let Some(root) = value.as_object_mut() {
        root.remove("status");
        if let Some(Value::Object(metadata)) = root.get_mut("metadata") {
            for field in SERVER_MANAGED_METADATA {
                metadata.remove(*field);
            }
        }
    }
    sort_keys(&value)
}

/// SHA-256 over the canonical serialization, hex encoded.
pub fn content_hash(manifest: &Manifest) -> String {
    let canonical = canonicalize(manifest);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: Value) -> Manifest {
        Manifest::from_value(value).unwrap()
    }

    #[test]
    fn test_hash_ignores_field_order() {
        let a = manifest(json!({
            "kind": "ConfigMap",
            "metadata": {"name": "settings", "namespace": "prod"},
            "data": {"a": "1", "b": "2"}
        }));
        let b = manifest(json!({
            "data": {"b": "2", "a": "1"},
            "metadata": {"namespace": "prod", "name": "settings"},
            "kind": "ConfigMap"
        }));
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_hash_ignores_server_managed_fields() {
        let desired = manifest(json!({
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "prod"},
            "spec": {"replicas": 1}
        }));
        let live = manifest(json!({
            "kind": "Deployment",
            "metadata": {
                "name": "web",
                "namespace": "prod",
                "uid": "7c9e",
                "resourceVersion": "41",
                "generation": 3,
                "creationTimestamp": "2025-11-02T09:00:00Z"
            },
            "spec": {"replicas": 1},
            "status": {"readyReplicas": 1}
        }));
        assert_eq!(content_hash(&desired), content_hash(&live));
    }

    #[test]
    fn test_hash_detects_content_change() {
        let one = manifest(json!({
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "prod"},
            "spec": {"replicas": 1}
        }));
        let three = manifest(json!({
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "prod"},
            "spec": {"replicas": 3}
        }));
        assert_ne!(content_hash(&one), content_hash(&three));
    }

    #[test]
    fn test_canonicalize_sorts_nested_keys() {
        let m = manifest(json!({
            "kind": "ConfigMap",
            "metadata": {"name": "settings"},
            "data": {"z": {"b": 1, "a": 2}, "a": true}
        }));
        let canonical = canonicalize(&m);
        let keys: Vec<&String> = canonical.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["data", "kind", "metadata"]);
    }
}
