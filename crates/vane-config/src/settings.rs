use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

/// Reconciliation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Seconds between periodic reconciliation ticks.
    pub reconcile_interval_secs: u64,
    /// Upper bound on applications reconciled concurrently.
    pub max_concurrent_reconciles: usize,
    /// Attempts per source fetch before the cycle gives up.
    pub source_retry_limit: u32,
    /// Attempts per resource action before it is recorded as failed.
    pub apply_retry_limit: u32,
    /// Base delay for apply retry backoff; doubles per attempt.
    pub apply_retry_base_delay_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 180,
            max_concurrent_reconciles: 4,
            source_retry_limit: 3,
            apply_retry_limit: 3,
            apply_retry_base_delay_ms: 200,
        }
    }
}

/// Location of the versioned configuration source store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub root: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./sources"),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive when RUST_LOG is not set.
    pub level: String,
    /// Either "text" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Root configuration for the controller process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub server: ServerConfig,
    pub controller: ReconcileConfig,
    pub source: SourceConfig,
    pub logging: LoggingConfig,
}

impl ControllerConfig {
    /// Validates the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` for values the controller cannot
    /// run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::validation("server.port must not be 0"));
        }
        if self.controller.reconcile_interval_secs == 0 {
            return Err(ConfigError::validation(
                "controller.reconcile_interval_secs must be at least 1",
            ));
        }
        if self.controller.max_concurrent_reconciles == 0 {
            return Err(ConfigError::validation(
                "controller.max_concurrent_reconciles must be at least 1",
            ));
        }
        if self.controller.apply_retry_base_delay_ms == 0 {
            return Err(ConfigError::validation(
                "controller.apply_retry_base_delay_ms must be at least 1",
            ));
        }
        if self.logging.format != "text" && self.logging.format != "json" {
            return Err(ConfigError::validation(format!(
                "logging.format must be \"text\" or \"json\", got \"{}\"",
                self.logging.format
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ControllerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut cfg = ControllerConfig::default();
        cfg.server.port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut cfg = ControllerConfig::default();
        cfg.controller.max_concurrent_reconciles = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_log_format() {
        let mut cfg = ControllerConfig::default();
        cfg.logging.format = "xml".to_string();
        assert!(cfg.validate().is_err());
    }
}
