use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::ids::ResourceId;

/// Label under which the owning application is recorded on every managed
/// resource. Written by the overlay compiler, never by hand.
pub const OWNER_LABEL: &str = "vane.dev/owner";

/// A declared or observed resource manifest.
///
/// Wraps a JSON object that is guaranteed to carry a `kind` and a
/// `metadata.name`. All other structure is opaque to the controller; typed
/// accessors exist only for the fields the compiler and the diff engine care
/// about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Manifest(Value);

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Manifest::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl Manifest {
    /// Wraps a JSON value, validating the minimal manifest shape.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidManifest` if the value is not an object and
    /// `CoreError::MissingField` if `kind` or `metadata.name` are absent.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(CoreError::invalid_manifest("manifest root must be an object"));
        }
        let manifest = Self(value);
        if manifest.0.get("kind").and_then(Value::as_str).is_none() {
            return Err(CoreError::missing_field("kind"));
        }
        if manifest
            .0
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .is_none()
        {
            return Err(CoreError::missing_field("metadata.name"));
        }
        Ok(manifest)
    }

    pub fn kind(&self) -> &str {
        self.0
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.0
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.0.pointer("/metadata/namespace").and_then(Value::as_str)
    }

    /// Full identity of this manifest.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MissingField` when `metadata.namespace` has not
    /// been set yet; compiled and live manifests always carry one.
    pub fn id(&self) -> Result<ResourceId> {
        let namespace = self
            .namespace()
            .ok_or_else(|| CoreError::missing_field("metadata.namespace"))?;
        Ok(ResourceId::new(self.kind(), namespace, self.name()))
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.metadata_mut()
            .insert("name".to_string(), Value::String(name.into()));
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.metadata_mut()
            .insert("namespace".to_string(), Value::String(namespace.into()));
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.0
            .pointer("/metadata/labels")
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str)
    }

    pub fn set_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let metadata = self.metadata_mut();
        let labels = metadata
            .entry("labels")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(labels) = labels {
            labels.insert(key.into(), Value::String(value.into()));
        }
    }

    /// The application that owns this resource, if any.
    pub fn owner(&self) -> Option<&str> {
        self.label(OWNER_LABEL)
    }

    pub fn set_owner(&mut self, app: impl Into<String>) {
        self.set_label(OWNER_LABEL, app);
    }

    pub fn replicas(&self) -> Option<u64> {
        self.0.pointer("/spec/replicas").and_then(Value::as_u64)
    }

    pub fn set_replicas(&mut self, replicas: u64) {
        if let Some(Value::Object(spec)) = self.0.get_mut("spec") {
            spec.insert("replicas".to_string(), Value::Number(replicas.into()));
        } else if let Value::Object(root) = &mut self.0 {
            let mut spec = Map::new();
            spec.insert("replicas".to_string(), Value::Number(replicas.into()));
            root.insert("spec".to_string(), Value::Object(spec));
        }
    }

    /// Identities of resources this manifest declares as its owners, resolved
    /// against this manifest's namespace. Used for delete propagation.
    pub fn owner_references(&self) -> Vec<ResourceId> {
        let namespace = self.namespace().unwrap_or_default();
        self.0
            .pointer("/metadata/ownerReferences")
            .and_then(Value::as_array)
            .map(|refs| {
                refs.iter()
                    .filter_map(|r| {
                        let kind = r.get("kind").and_then(Value::as_str)?;
                        let name = r.get("name").and_then(Value::as_str)?;
                        Some(ResourceId::new(kind, namespace, name))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn as_value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let root = self
            .0
            .as_object_mut()
            .expect("manifest root is validated as an object");
        let metadata = root
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        metadata
            .as_object_mut()
            .expect("metadata is always an object")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment() -> Manifest {
        Manifest::from_value(json!({
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "prod"},
            "spec": {"replicas": 2, "image": "registry.local/web:1.0"}
        }))
        .unwrap()
    }

    #[test]
    fn test_from_value_requires_object() {
        assert!(Manifest::from_value(json!([1, 2])).is_err());
        assert!(Manifest::from_value(json!("deployment")).is_err());
    }

    #[test]
    fn test_from_value_requires_kind_and_name() {
        assert!(Manifest::from_value(json!({"metadata": {"name": "web"}})).is_err());
        assert!(Manifest::from_value(json!({"kind": "Deployment"})).is_err());
        assert!(Manifest::from_value(json!({"kind": "Deployment", "metadata": {}})).is_err());
    }

    #[test]
    fn test_identity_accessors() {
        let manifest = deployment();
        assert_eq!(manifest.kind(), "Deployment");
        assert_eq!(manifest.name(), "web");
        assert_eq!(manifest.namespace(), Some("prod"));
        assert_eq!(
            manifest.id().unwrap(),
            ResourceId::new("Deployment", "prod", "web")
        );
    }

    #[test]
    fn test_id_requires_namespace() {
        let manifest = Manifest::from_value(json!({
            "kind": "ConfigMap",
            "metadata": {"name": "settings"}
        }))
        .unwrap();
        assert!(manifest.id().is_err());
    }

    #[test]
    fn test_owner_label_roundtrip() {
        let mut manifest = deployment();
        assert_eq!(manifest.owner(), None);
        manifest.set_owner("demo");
        assert_eq!(manifest.owner(), Some("demo"));
        assert_eq!(manifest.label(OWNER_LABEL), Some("demo"));
    }

    #[test]
    fn test_set_replicas() {
        let mut manifest = deployment();
        assert_eq!(manifest.replicas(), Some(2));
        manifest.set_replicas(5);
        assert_eq!(manifest.replicas(), Some(5));
    }

    #[test]
    fn test_set_replicas_creates_spec() {
        let mut manifest = Manifest::from_value(json!({
            "kind": "Deployment",
            "metadata": {"name": "web"}
        }))
        .unwrap();
        manifest.set_replicas(3);
        assert_eq!(manifest.replicas(), Some(3));
    }

    #[test]
    fn test_deserialize_validates_shape() {
        let ok: std::result::Result<Manifest, _> =
            serde_json::from_str(r#"{"kind": "ConfigMap", "metadata": {"name": "settings"}}"#);
        assert!(ok.is_ok());
        let missing_kind: std::result::Result<Manifest, _> =
            serde_json::from_str(r#"{"metadata": {"name": "settings"}}"#);
        assert!(missing_kind.is_err());
    }

    #[test]
    fn test_owner_references() {
        let manifest = Manifest::from_value(json!({
            "kind": "ReplicaSet",
            "metadata": {
                "name": "web-abc",
                "namespace": "prod",
                "ownerReferences": [{"kind": "Deployment", "name": "web"}]
            }
        }))
        .unwrap();
        assert_eq!(
            manifest.owner_references(),
            vec![ResourceId::new("Deployment", "prod", "web")]
        );
    }
}
