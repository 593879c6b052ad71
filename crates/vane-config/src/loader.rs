//! Layered configuration loading.
//!
//! Builds the effective configuration by deep-merging, in priority order,
//! hardcoded defaults, an optional `vane.toml`, and `VANE__SECTION__KEY`
//! environment variables.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::settings::ControllerConfig;
use crate::ConfigError;

/// Prefix for configuration environment variables.
const ENV_PREFIX: &str = "VANE__";

/// Captured `VANE__*` environment overrides.
///
/// Captured as plain pairs so tests can inject overrides without touching
/// process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides(Vec<(String, String)>);

impl EnvOverrides {
    /// Capture all `VANE__*` variables from the process environment.
    pub fn from_env() -> Self {
        Self(
            std::env::vars()
                .filter(|(key, _)| key.starts_with(ENV_PREFIX))
                .collect(),
        )
    }

    /// Build overrides from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Loads the effective controller configuration.
///
/// # Errors
///
/// Returns `ConfigError::Io` when a given file path cannot be read,
/// `ConfigError::Parse` for malformed TOML or type mismatches, and
/// `ConfigError::Validation` when the merged result fails validation.
pub fn load_config(path: Option<&Path>) -> Result<ControllerConfig, ConfigError> {
    load_config_with(path, &EnvOverrides::from_env())
}

/// Loads configuration with explicit environment overrides.
pub fn load_config_with(
    path: Option<&Path>,
    env: &EnvOverrides,
) -> Result<ControllerConfig, ConfigError> {
    let mut merged = serde_json::to_value(ControllerConfig::default())
        .map_err(|e| ConfigError::parse(format!("default config serialization: {e}")))?;

    if let Some(path) = path {
        let raw = std::fs::read_to_string(path)?;
        let file: toml::Value = toml::from_str(&raw)
            .map_err(|e| ConfigError::parse(format!("TOML parse error in {}: {e}", path.display())))?;
        let file = serde_json::to_value(file)
            .map_err(|e| ConfigError::parse(format!("TOML conversion error: {e}")))?;
        merge_value(&mut merged, file);
        debug!(path = %path.display(), "Merged configuration file");
    }

    for (key, raw) in &env.0 {
        let Some(segments) = parse_env_key(key) else {
            continue;
        };
        set_path(&mut merged, &segments, parse_env_value(raw));
        debug!(key = %key, "Applied environment override");
    }

    let config: ControllerConfig = serde_json::from_value(merged)
        .map_err(|e| ConfigError::parse(format!("invalid configuration: {e}")))?;
    config.validate()?;
    Ok(config)
}

/// Deep merge: objects merge recursively, everything else replaces.
fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay) => *base_slot = overlay,
    }
}

/// `VANE__SERVER__PORT` → `["server", "port"]`.
fn parse_env_key(key: &str) -> Option<Vec<String>> {
    let rest = key.strip_prefix(ENV_PREFIX)?;
    let segments: Vec<String> = rest
        .split("__")
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

/// Numbers and booleans parse as themselves, everything else is a string.
fn parse_env_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_path(root: &mut Value, segments: &[String], value: Value) {
    let mut cursor = root;
    for segment in &segments[..segments.len() - 1] {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        let Value::Object(map) = cursor else { return };
        cursor = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Some(leaf) = segments.last() {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        if let Some(map) = cursor.as_object_mut() {
            map.insert(leaf.clone(), value);
        }
    }
}
