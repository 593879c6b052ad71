//! Configuration management for the Vane controller.
//!
//! Settings are merged from three sources with increasing priority:
//! 1. Defaults - hardcoded sane defaults
//! 2. File config - from vane.toml
//! 3. Environment variables - VANE__* pattern
//!
//! The merged result is validated before the controller starts; a bad
//! configuration is a startup failure, not something to reconcile around.

pub mod loader;
pub mod settings;

pub use loader::{load_config, EnvOverrides};
pub use settings::{
    ControllerConfig, LoggingConfig, ReconcileConfig, ServerConfig, SourceConfig,
};

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
