//! The compilation pipeline: source tree in, concrete resource set out.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use tracing::debug;
use vane_core::{Manifest, ResourceId};
use vane_source::SourceTree;

use crate::error::CompileError;
use crate::model::Overlay;

/// Component file that declares a directory's overlay.
const COMPONENT_FILE: &str = "vane.json";

/// Maximum length of a base chain. Deeper chains are assumed cyclic.
const MAX_LAYER_DEPTH: usize = 10;

/// Inputs the compiler needs beyond the tree itself.
#[derive(Debug, Clone, Copy)]
pub struct CompileParams<'a> {
    /// Application the compiled resources will be owned by.
    pub owner: &'a str,
    /// Namespace injected into manifests that do not set one.
    pub default_namespace: &'a str,
    /// Whether a compiled set of zero resources is acceptable.
    pub allow_empty: bool,
}

/// Compiles the layer at `path` inside `tree` into the desired resource set.
///
/// The layer's base chain is resolved first (deepest base compiles first),
/// then each layer contributes its own resources and applies its patches and
/// transformers to everything compiled so far. The result carries the
/// ownership marker and a namespace on every manifest, has unique
/// identities, and is sorted by identity.
///
/// # Errors
///
/// Returns `CompileError` for malformed component or manifest files,
/// unresolved patch targets, identity collisions, cyclic base chains, and an
/// empty result when `allow_empty` is false. On error no partial resource
/// set escapes.
pub fn compile(
    tree: &SourceTree,
    path: &str,
    params: &CompileParams<'_>,
) -> Result<Vec<Manifest>, CompileError> {
    let layers = resolve_chain(tree, path)?;

    let mut resources: Vec<Manifest> = Vec::new();
    for (dir, overlay) in &layers {
        let mut own = load_resources(tree, dir, overlay)?;
        resources.append(&mut own);
        resources = overlay.apply(&resources)?;
    }

    for manifest in &mut resources {
        if manifest.namespace().is_none() {
            manifest.set_namespace(params.default_namespace);
        }
        manifest.set_owner(params.owner);
    }

    let mut by_id: BTreeMap<ResourceId, Manifest> = BTreeMap::new();
    for manifest in resources {
        let id = manifest
            .id()
            .map_err(|e| CompileError::invalid_manifest_file(path, e.to_string()))?;
        if by_id.insert(id.clone(), manifest).is_some() {
            return Err(CompileError::DuplicateResource { id });
        }
    }

    if by_id.is_empty() && !params.allow_empty {
        return Err(CompileError::EmptyResourceSet);
    }

    debug!(
        path,
        layers = layers.len(),
        resources = by_id.len(),
        "Compiled resource set"
    );
    Ok(by_id.into_values().collect())
}

/// Resolves the base chain starting at `path`, returning layers base-first.
fn resolve_chain(tree: &SourceTree, path: &str) -> Result<Vec<(String, Overlay)>, CompileError> {
    let mut chain: Vec<(String, Overlay)> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut current = path.trim_matches('/').to_string();

    loop {
        if !visited.insert(current.clone()) || chain.len() >= MAX_LAYER_DEPTH {
            return Err(CompileError::BaseChainInvalid {
                path: path.to_string(),
            });
        }
        let overlay = load_component(tree, &current)?;
        let base = overlay.base.clone();
        chain.push((current, overlay));
        match base {
            Some(base) => current = base.trim_matches('/').to_string(),
            None => break,
        }
    }

    chain.reverse();
    Ok(chain)
}

fn load_component(tree: &SourceTree, dir: &str) -> Result<Overlay, CompileError> {
    let component_path = join(dir, COMPONENT_FILE);
    match tree.get(&component_path) {
        Some(bytes) => serde_json::from_slice(bytes)
            .map_err(|e| CompileError::invalid_component(&component_path, e.to_string())),
        None => Ok(Overlay::default()),
    }
}

/// Loads the manifests a layer contributes: the files it lists, or every
/// JSON file directly in its directory except the component file.
fn load_resources(
    tree: &SourceTree,
    dir: &str,
    overlay: &Overlay,
) -> Result<Vec<Manifest>, CompileError> {
    let paths: Vec<String> = if overlay.resources.is_empty() {
        tree.files_under(dir)
            .filter(|(path, _)| {
                path.ends_with(".json")
                    && !path.ends_with(COMPONENT_FILE)
                    && is_direct_child(dir, path)
            })
            .map(|(path, _)| path.to_string())
            .collect()
    } else {
        overlay.resources.iter().map(|r| join(dir, r)).collect()
    };

    let mut manifests = Vec::new();
    for path in paths {
        let bytes = tree
            .get(&path)
            .ok_or_else(|| CompileError::invalid_manifest_file(&path, "file not found"))?;
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CompileError::invalid_manifest_file(&path, e.to_string()))?;
        match value {
            Value::Array(items) => {
                for item in items {
                    manifests.push(parse_manifest(&path, item)?);
                }
            }
            other => manifests.push(parse_manifest(&path, other)?),
        }
    }
    Ok(manifests)
}

fn parse_manifest(path: &str, value: Value) -> Result<Manifest, CompileError> {
    Manifest::from_value(value)
        .map_err(|e| CompileError::invalid_manifest_file(path, e.to_string()))
}

fn join(dir: &str, file: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{dir}/{file}")
    }
}

fn is_direct_child(dir: &str, path: &str) -> bool {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        return !path.contains('/');
    }
    path.strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| !rest.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as FileMap;

    fn tree(entries: &[(&str, &str)]) -> SourceTree {
        let files: FileMap<String, Vec<u8>> = entries
            .iter()
            .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
            .collect();
        SourceTree::new("rev-1", files)
    }

    fn params() -> CompileParams<'static> {
        CompileParams {
            owner: "demo",
            default_namespace: "default",
            allow_empty: false,
        }
    }

    #[test]
    fn test_plain_directory_compiles_all_json_files() {
        let tree = tree(&[
            ("base/app.json", r#"{"kind": "Deployment", "metadata": {"name": "web"}}"#),
            ("base/svc.json", r#"{"kind": "Service", "metadata": {"name": "web"}}"#),
            ("base/notes.txt", "ignored"),
        ]);
        let set = compile(&tree, "base", &params()).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.iter().all(|m| m.owner() == Some("demo")));
        assert!(set.iter().all(|m| m.namespace() == Some("default")));
    }

    #[test]
    fn test_nested_files_belong_to_other_layers() {
        let tree = tree(&[
            ("base/app.json", r#"{"kind": "Deployment", "metadata": {"name": "web"}}"#),
            ("base/sub/extra.json", r#"{"kind": "Service", "metadata": {"name": "x"}}"#),
        ]);
        let set = compile(&tree, "base", &params()).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_duplicate_identity_is_an_error() {
        let tree = tree(&[
            ("base/a.json", r#"{"kind": "Service", "metadata": {"name": "web"}}"#),
            ("base/b.json", r#"{"kind": "Service", "metadata": {"name": "web"}}"#),
        ]);
        let err = compile(&tree, "base", &params()).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateResource { .. }));
    }

    #[test]
    fn test_empty_set_requires_allow_empty() {
        let tree = tree(&[("base/notes.txt", "no manifests here")]);
        let err = compile(&tree, "base", &params()).unwrap_err();
        assert!(matches!(err, CompileError::EmptyResourceSet));

        let mut allowing = params();
        allowing.allow_empty = true;
        let set = compile(&tree, "base", &allowing).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_cyclic_base_chain_is_an_error() {
        let tree = tree(&[
            ("a/vane.json", r#"{"base": "b"}"#),
            ("b/vane.json", r#"{"base": "a"}"#),
        ]);
        let err = compile(&tree, "a", &params()).unwrap_err();
        assert!(matches!(err, CompileError::BaseChainInvalid { .. }));
    }

    #[test]
    fn test_listed_resources_override_discovery() {
        let tree = tree(&[
            ("base/vane.json", r#"{"resources": ["app.json"]}"#),
            ("base/app.json", r#"{"kind": "Deployment", "metadata": {"name": "web"}}"#),
            ("base/svc.json", r#"{"kind": "Service", "metadata": {"name": "web"}}"#),
        ]);
        let set = compile(&tree, "base", &params()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].kind(), "Deployment");
    }

    #[test]
    fn test_manifest_array_files() {
        let tree = tree(&[(
            "base/all.json",
            r#"[
                {"kind": "Deployment", "metadata": {"name": "web"}},
                {"kind": "Service", "metadata": {"name": "web"}}
            ]"#,
        )]);
        let set = compile(&tree, "base", &params()).unwrap();
        assert_eq!(set.len(), 2);
    }
}
