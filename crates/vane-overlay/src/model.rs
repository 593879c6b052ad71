use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vane_core::Manifest;

use crate::error::CompileError;
use crate::patch::apply_patch;
use crate::transform::apply_transformers;

/// Resource a patch addresses, by kind and name within the layer being
/// compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchTarget {
    pub kind: String,
    pub name: String,
}

/// One patch inside an overlay.
///
/// A strategic-merge patch addresses its target through the `kind` and
/// `metadata.name` of the patch body and deep-merges into it; a JSON patch
/// names its target explicitly and applies RFC 6902 operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Patch {
    JsonPatch { target: PatchTarget, ops: Vec<Value> },
    StrategicMerge { merge: Value },
}

/// Image name/tag substitution.
///
/// Matches any `image` string field whose name part equals `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSubstitution {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tag: Option<String>,
}

/// Replica count override for one named resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaOverride {
    /// Resource name as visible when transformers run, i.e. after any name
    /// prefix from the same overlay has been applied.
    pub name: String,
    pub count: u64,
}

/// Transformers of one overlay.
///
/// Applied in a fixed order regardless of how they are declared: name
/// prefix, namespace injection, common labels, image substitution, replica
/// override. The fixed order keeps compilation reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transformers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub common_labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageSubstitution>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replicas: Vec<ReplicaOverride>,
}

impl Transformers {
    pub fn is_empty(&self) -> bool {
        self.name_prefix.is_none()
            && self.namespace.is_none()
            && self.common_labels.is_empty()
            && self.images.is_empty()
            && self.replicas.is_empty()
    }
}

/// One layer of the compilation chain, declared in a directory's
/// `vane.json` component file.
///
/// A directory without a component file is a plain resource directory: all
/// of its JSON files, no patches, no transformers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Overlay {
    /// Repo-relative path of the layer this one refines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Manifest files of this layer, relative to its directory. When empty,
    /// every `*.json` file in the directory except the component file.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<Patch>,
    #[serde(skip_serializing_if = "Transformers::is_empty")]
    pub transformers: Transformers,
}

impl Overlay {
    /// Applies this overlay's patches and transformers to a resource set.
    ///
    /// Pure with respect to the input: the given resources are cloned, the
    /// originals are never mutated.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::UnresolvedPatchTarget` when a patch addresses
    /// no resource in the set and `CompileError::PatchFailed` when a patch
    /// operation cannot be applied.
    pub fn apply(&self, resources: &[Manifest]) -> Result<Vec<Manifest>, CompileError> {
        let mut out: Vec<Manifest> = resources.to_vec();
        for patch in &self.patches {
            apply_patch(&mut out, patch)?;
        }
        apply_transformers(&mut out, &self.transformers);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_deserializes_both_forms() {
        let strategic: Patch = serde_json::from_value(json!({
            "merge": {"kind": "Deployment", "metadata": {"name": "web"}, "spec": {"replicas": 3}}
        }))
        .unwrap();
        assert!(matches!(strategic, Patch::StrategicMerge { .. }));

        let rfc6902: Patch = serde_json::from_value(json!({
            "target": {"kind": "Deployment", "name": "web"},
            "ops": [{"op": "replace", "path": "/spec/replicas", "value": 3}]
        }))
        .unwrap();
        assert!(matches!(rfc6902, Patch::JsonPatch { .. }));
    }

    #[test]
    fn test_overlay_component_deserializes() {
        let overlay: Overlay = serde_json::from_value(json!({
            "base": "base",
            "transformers": {
                "namePrefix": "b-",
                "namespace": "ns-b",
                "commonLabels": {"env": "b"}
            },
            "patches": [{
                "target": {"kind": "Deployment", "name": "web"},
                "ops": [{"op": "replace", "path": "/spec/replicas", "value": 3}]
            }]
        }))
        .unwrap();
        assert_eq!(overlay.base.as_deref(), Some("base"));
        assert_eq!(overlay.transformers.name_prefix.as_deref(), Some("b-"));
        assert_eq!(overlay.patches.len(), 1);
    }

    #[test]
    fn test_apply_does_not_mutate_input() {
        let base = vec![
            Manifest::from_value(json!({
                "kind": "Deployment",
                "metadata": {"name": "web"},
                "spec": {"replicas": 1}
            }))
            .unwrap(),
        ];
        let overlay = Overlay {
            transformers: Transformers {
                name_prefix: Some("b-".to_string()),
                ..Transformers::default()
            },
            ..Overlay::default()
        };
        let out = overlay.apply(&base).unwrap();
        assert_eq!(out[0].name(), "b-web");
        assert_eq!(base[0].name(), "web");
    }
}
