//! Transformer application for overlay compilation.
//!
//! Transformers run in one fixed order: name prefix, namespace injection,
//! common labels, image substitution, replica override. Declaration order in
//! the component file never changes the result.

use serde_json::Value;
use vane_core::Manifest;

use crate::model::{ImageSubstitution, Transformers};

pub(crate) fn apply_transformers(resources: &mut [Manifest], transformers: &Transformers) {
    if let Some(prefix) = &transformers.name_prefix {
        for manifest in resources.iter_mut() {
            let prefixed = format!("{prefix}{}", manifest.name());
            manifest.set_name(prefixed);
        }
    }

    if let Some(namespace) = &transformers.namespace {
        for manifest in resources.iter_mut() {
            manifest.set_namespace(namespace.clone());
        }
    }

    for (key, value) in &transformers.common_labels {
        for manifest in resources.iter_mut() {
            manifest.set_label(key.clone(), value.clone());
        }
    }

    if !transformers.images.is_empty() {
        for manifest in resources.iter_mut() {
            rewrite_images(manifest.as_value_mut(), &transformers.images);
        }
    }

    for replica_override in &transformers.replicas {
        for manifest in resources.iter_mut() {
            if manifest.name() == replica_override.name {
                manifest.set_replicas(replica_override.count);
            }
        }
    }
}

/// Rewrites every `image` string field whose name part matches one of the
/// substitutions. Recurses through objects and arrays, so container lists
/// are covered wherever they nest.
fn rewrite_images(value: &mut Value, substitutions: &[ImageSubstitution]) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "image" {
                    if let Value::String(image) = child {
                        if let Some(rewritten) = substitute_image(image, substitutions) {
                            *child = Value::String(rewritten);
                            continue;
                        }
                    }
                }
                rewrite_images(child, substitutions);
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_images(item, substitutions);
            }
        }
        _ => {}
    }
}

fn substitute_image(image: &str, substitutions: &[ImageSubstitution]) -> Option<String> {
    let (name, tag) = split_image(image);
    let substitution = substitutions.iter().find(|s| s.name == name)?;
    let new_name = substitution.new_name.as_deref().unwrap_or(name);
    let new_tag = substitution.new_tag.as_deref().or(tag);
    Some(match new_tag {
        Some(tag) => format!("{new_name}:{tag}"),
        None => new_name.to_string(),
    })
}

/// Splits an image reference into name and tag. The tag separator is the
/// last `:` that appears after the last `/`, so registry ports survive.
fn split_image(image: &str) -> (&str, Option<&str>) {
    match image.rfind(':') {
        Some(idx) if !image[idx..].contains('/') => (&image[..idx], Some(&image[idx + 1..])),
        _ => (image, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReplicaOverride;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn deployment() -> Manifest {
        Manifest::from_value(json!({
            "kind": "Deployment",
            "metadata": {"name": "web"},
            "spec": {
                "replicas": 1,
                "template": {
                    "containers": [
                        {"name": "web", "image": "registry.local/web:1.0"},
                        {"name": "sidecar", "image": "registry.local:5000/proxy"}
                    ]
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_prefix_namespace_and_labels() {
        let mut set = vec![deployment()];
        let transformers = Transformers {
            name_prefix: Some("b-".to_string()),
            namespace: Some("ns-b".to_string()),
            common_labels: BTreeMap::from([("env".to_string(), "b".to_string())]),
            ..Transformers::default()
        };
        apply_transformers(&mut set, &transformers);
        assert_eq!(set[0].name(), "b-web");
        assert_eq!(set[0].namespace(), Some("ns-b"));
        assert_eq!(set[0].label("env"), Some("b"));
    }

    #[test]
    fn test_replica_override_sees_prefixed_name() {
        let mut set = vec![deployment()];
        let transformers = Transformers {
            name_prefix: Some("b-".to_string()),
            replicas: vec![ReplicaOverride {
                name: "b-web".to_string(),
                count: 3,
            }],
            ..Transformers::default()
        };
        apply_transformers(&mut set, &transformers);
        assert_eq!(set[0].replicas(), Some(3));
    }

    #[test]
    fn test_image_substitution_in_nested_containers() {
        let mut set = vec![deployment()];
        let transformers = Transformers {
            images: vec![ImageSubstitution {
                name: "registry.local/web".to_string(),
                new_name: None,
                new_tag: Some("2.0".to_string()),
            }],
            ..Transformers::default()
        };
        apply_transformers(&mut set, &transformers);
        let image = set[0]
            .as_value()
            .pointer("/spec/template/containers/0/image")
            .and_then(Value::as_str);
        assert_eq!(image, Some("registry.local/web:2.0"));
        // non-matching image untouched
        let sidecar = set[0]
            .as_value()
            .pointer("/spec/template/containers/1/image")
            .and_then(Value::as_str);
        assert_eq!(sidecar, Some("registry.local:5000/proxy"));
    }

    #[test]
    fn test_split_image_handles_registry_port() {
        assert_eq!(
            split_image("registry.local:5000/proxy"),
            ("registry.local:5000/proxy", None)
        );
        assert_eq!(
            split_image("registry.local:5000/proxy:1.2"),
            ("registry.local:5000/proxy", Some("1.2"))
        );
        assert_eq!(split_image("web"), ("web", None));
    }
}
