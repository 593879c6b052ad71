use thiserror::Error;
use vane_core::ResourceId;

/// Errors that can occur against the target environment.
#[derive(Debug, Clone, Error)]
pub enum ClusterError {
    /// The addressed resource does not exist.
    #[error("Resource not found: {id}")]
    NotFound { id: ResourceId },

    /// The target namespace has not been created.
    #[error("Namespace '{namespace}' does not exist")]
    NamespaceMissing { namespace: String },

    /// The environment rejected the manifest.
    #[error("Validation rejected for {id}: {message}")]
    Validation { id: ResourceId, message: String },

    /// The environment is shedding load; the action can be retried.
    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    /// The watch stream ended and must be re-established.
    #[error("Watch stream closed")]
    WatchClosed,

    /// Anything else.
    #[error("Cluster error: {message}")]
    Internal { message: String },
}

impl ClusterError {
    pub fn not_found(id: ResourceId) -> Self {
        Self::NotFound { id }
    }

    pub fn namespace_missing(namespace: impl Into<String>) -> Self {
        Self::NamespaceMissing {
            namespace: namespace.into(),
        }
    }

    pub fn validation(id: ResourceId, message: impl Into<String>) -> Self {
        Self::Validation {
            id,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the same action can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::WatchClosed | Self::Internal { .. })
    }
}
