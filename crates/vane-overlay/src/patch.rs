//! Patch application for overlay compilation.

use serde_json::Value;
use vane_core::Manifest;

use crate::error::CompileError;
use crate::model::Patch;

/// Applies one patch to every matching resource in the set.
///
/// # Errors
///
/// Returns `CompileError::UnresolvedPatchTarget` when no resource matches
/// the patch target.
pub(crate) fn apply_patch(resources: &mut [Manifest], patch: &Patch) -> Result<(), CompileError> {
    let (kind, name) = patch_target(patch)?;

    let mut matched = false;
    for manifest in resources.iter_mut() {
        if manifest.kind() == kind && manifest.name() == name {
            matched = true;
            let mut patched = manifest.as_value().clone();
            match patch {
                Patch::StrategicMerge { merge } => {
                    merge_values(&mut patched, merge);
                }
                Patch::JsonPatch { ops, .. } => {
                    apply_json_patch(&mut patched, ops, &kind, &name)?;
                }
            }
            *manifest = validated(patched, &kind, &name)?;
        }
    }

    if matched {
        Ok(())
    } else {
        Err(CompileError::unresolved_patch_target(kind, name))
    }
}

/// A patched manifest must still be a well-formed manifest with the same
/// identity the patch addressed.
fn validated(value: Value, kind: &str, name: &str) -> Result<Manifest, CompileError> {
    let manifest = Manifest::from_value(value)
        .map_err(|e| CompileError::patch_failed(kind, name, e.to_string()))?;
    if manifest.kind() != kind || manifest.name() != name {
        return Err(CompileError::patch_failed(
            kind,
            name,
            "patch may not change the resource identity",
        ));
    }
    Ok(manifest)
}

fn patch_target(patch: &Patch) -> Result<(String, String), CompileError> {
    match patch {
        Patch::JsonPatch { target, .. } => Ok((target.kind.clone(), target.name.clone())),
        Patch::StrategicMerge { merge } => {
            let kind = merge.get("kind").and_then(Value::as_str);
            let name = merge.pointer("/metadata/name").and_then(Value::as_str);
            match (kind, name) {
                (Some(kind), Some(name)) => Ok((kind.to_string(), name.to_string())),
                _ => Err(CompileError::patch_failed(
                    kind.unwrap_or("<unknown>"),
                    name.unwrap_or("<unknown>"),
                    "strategic-merge patch body must carry kind and metadata.name",
                )),
            }
        }
    }
}

/// Strategic merge: objects merge recursively, `null` deletes a key, arrays
/// and scalars replace.
fn merge_values(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    target_map.remove(key);
                    continue;
                }
                match target_map.get_mut(key) {
                    Some(existing) => merge_values(existing, patch_value),
                    None => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (target_slot, patch_value) => *target_slot = patch_value.clone(),
    }
}

/// Paths a JSON patch may not touch: identity is addressed through the
/// patch target, not rewritten by operations.
const PROTECTED_PATHS: &[&str] = &["/kind", "/metadata/name"];

fn apply_json_patch(
    value: &mut Value,
    ops: &[Value],
    kind: &str,
    name: &str,
) -> Result<(), CompileError> {
    for op in ops {
        let path = op.get("path").and_then(Value::as_str).unwrap_or_default();
        let protected = PROTECTED_PATHS
            .iter()
            .any(|p| path == *p || path.starts_with(&format!("{p}/")));
        if protected {
            return Err(CompileError::patch_failed(
                kind,
                name,
                format!("operation path '{path}' would rewrite the resource identity"),
            ));
        }
    }

    let document: json_patch::Patch = serde_json::from_value(Value::Array(ops.to_vec()))
        .map_err(|e| {
            CompileError::patch_failed(kind, name, format!("invalid RFC 6902 document: {e}"))
        })?;

    json_patch::patch(value, &document)
        .map_err(|e| CompileError::patch_failed(kind, name, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PatchTarget;
    use serde_json::json;

    fn resources() -> Vec<Manifest> {
        vec![
            Manifest::from_value(json!({
                "kind": "Deployment",
                "metadata": {"name": "web", "labels": {"tier": "frontend"}},
                "spec": {"replicas": 1, "image": "registry.local/web:1.0"}
            }))
            .unwrap(),
            Manifest::from_value(json!({
                "kind": "Service",
                "metadata": {"name": "web"},
                "spec": {"port": 80}
            }))
            .unwrap(),
        ]
    }

    #[test]
    fn test_strategic_merge_merges_and_deletes() {
        let mut set = resources();
        let patch = Patch::StrategicMerge {
            merge: json!({
                "kind": "Deployment",
                "metadata": {"name": "web", "labels": {"tier": null}},
                "spec": {"replicas": 3}
            }),
        };
        apply_patch(&mut set, &patch).unwrap();
        assert_eq!(set[0].replicas(), Some(3));
        assert_eq!(set[0].label("tier"), None);
        // only the addressed resource changes
        assert_eq!(set[1].as_value().pointer("/spec/port"), Some(&json!(80)));
    }

    #[test]
    fn test_json_patch_replaces_value() {
        let mut set = resources();
        let patch = Patch::JsonPatch {
            target: PatchTarget {
                kind: "Deployment".to_string(),
                name: "web".to_string(),
            },
            ops: vec![json!({"op": "replace", "path": "/spec/replicas", "value": 5})],
        };
        apply_patch(&mut set, &patch).unwrap();
        assert_eq!(set[0].replicas(), Some(5));
    }

    #[test]
    fn test_unresolved_target_is_an_error() {
        let mut set = resources();
        let patch = Patch::StrategicMerge {
            merge: json!({"kind": "Deployment", "metadata": {"name": "ghost"}}),
        };
        let err = apply_patch(&mut set, &patch).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedPatchTarget { .. }));
    }

    #[test]
    fn test_json_patch_cannot_rewrite_identity() {
        let mut set = resources();
        let patch = Patch::JsonPatch {
            target: PatchTarget {
                kind: "Deployment".to_string(),
                name: "web".to_string(),
            },
            ops: vec![json!({"op": "replace", "path": "/metadata/name", "value": "other"})],
        };
        let err = apply_patch(&mut set, &patch).unwrap_err();
        assert!(matches!(err, CompileError::PatchFailed { .. }));
    }

    #[test]
    fn test_replacing_whole_metadata_cannot_smuggle_a_rename() {
        let mut set = resources();
        let patch = Patch::JsonPatch {
            target: PatchTarget {
                kind: "Deployment".to_string(),
                name: "web".to_string(),
            },
            ops: vec![json!({"op": "replace", "path": "/metadata", "value": {"name": "other"}})],
        };
        let err = apply_patch(&mut set, &patch).unwrap_err();
        assert!(matches!(err, CompileError::PatchFailed { .. }));
        // the original resource is untouched
        assert_eq!(set[0].name(), "web");
    }

    #[test]
    fn test_invalid_ops_document_is_an_error() {
        let mut set = resources();
        let patch = Patch::JsonPatch {
            target: PatchTarget {
                kind: "Service".to_string(),
                name: "web".to_string(),
            },
            ops: vec![json!({"op": "teleport", "path": "/spec/port"})],
        };
        let err = apply_patch(&mut set, &patch).unwrap_err();
        assert!(matches!(err, CompileError::PatchFailed { .. }));
    }
}
