use thiserror::Error;

/// Core error types for Vane operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid application name '{name}': {reason}")]
    InvalidAppName { name: String, reason: String },

    #[error("Invalid manifest: {message}")]
    InvalidManifest { message: String },

    #[error("Manifest is missing required field '{field}'")]
    MissingField { field: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new InvalidAppName error
    pub fn invalid_app_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAppName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidManifest error
    pub fn invalid_manifest(message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            message: message.into(),
        }
    }

    /// Create a new MissingField error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Check if this error is caused by invalid input rather than by the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAppName { .. }
                | Self::InvalidManifest { .. }
                | Self::MissingField { .. }
                | Self::JsonError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
