use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Identity of a resource in the target environment.
///
/// The `(kind, namespace, name)` triple is globally unique within one
/// environment and is the key used by the live-state cache, the diff engine
/// and the sync executor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Maximum length of an application name (DNS label rules).
const MAX_APP_NAME_LEN: usize = 63;

/// Validates an application name.
///
/// Names follow DNS label rules: lowercase alphanumerics and `-`, starting
/// and ending with an alphanumeric, at most 63 characters.
pub fn validate_app_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_app_name(name, "name is empty"));
    }
    if name.len() > MAX_APP_NAME_LEN {
        return Err(CoreError::invalid_app_name(
            name,
            format!("name exceeds {MAX_APP_NAME_LEN} characters"),
        ));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_chars {
        return Err(CoreError::invalid_app_name(
            name,
            "only lowercase alphanumerics and '-' are allowed",
        ));
    }
    let starts_ok = name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let ends_ok = name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
    if !starts_ok || !ends_ok {
        return Err(CoreError::invalid_app_name(
            name,
            "name must start and end with an alphanumeric character",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_display() {
        let id = ResourceId::new("Deployment", "prod", "web");
        assert_eq!(id.to_string(), "Deployment/prod/web");
    }

    #[test]
    fn test_resource_id_ordering() {
        let a = ResourceId::new("ConfigMap", "prod", "settings");
        let b = ResourceId::new("Deployment", "prod", "web");
        assert!(a < b);
    }

    #[test]
    fn test_validate_app_name_valid() {
        assert!(validate_app_name("demo").is_ok());
        assert!(validate_app_name("demo-env-b").is_ok());
        assert!(validate_app_name("a").is_ok());
        assert!(validate_app_name("app2").is_ok());
    }

    #[test]
    fn test_validate_app_name_invalid() {
        assert!(validate_app_name("").is_err());
        assert!(validate_app_name("-demo").is_err());
        assert!(validate_app_name("demo-").is_err());
        assert!(validate_app_name("Demo").is_err());
        assert!(validate_app_name("de mo").is_err());
        assert!(validate_app_name(&"x".repeat(64)).is_err());
    }
}
