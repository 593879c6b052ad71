use thiserror::Error;
use vane_cluster::ClusterError;
use vane_core::CoreError;
use vane_overlay::CompileError;
use vane_source::SourceError;

/// Errors from engine operations.
///
/// Failures during a cycle stay local to that application; these variants
/// surface through the query interface and never cross application
/// boundaries.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Application '{name}' not found")]
    AppNotFound { name: String },

    #[error("Application '{name}' already exists")]
    AppExists { name: String },

    #[error("Revision {index} is not available for application '{name}'")]
    RevisionNotFound { name: String, index: usize },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Source fetch failed: {0}")]
    Source(#[from] SourceError),

    #[error("Compilation failed: {0}")]
    Compile(#[from] CompileError),

    #[error("Cluster operation failed: {0}")]
    Cluster(#[from] ClusterError),
}

impl EngineError {
    pub fn app_not_found(name: impl Into<String>) -> Self {
        Self::AppNotFound { name: name.into() }
    }

    pub fn app_exists(name: impl Into<String>) -> Self {
        Self::AppExists { name: name.into() }
    }

    pub fn revision_not_found(name: impl Into<String>, index: usize) -> Self {
        Self::RevisionNotFound {
            name: name.into(),
            index,
        }
    }

    /// Whether the error is the caller's fault rather than the system's.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::AppNotFound { .. } | Self::AppExists { .. } | Self::RevisionNotFound { .. } => {
                true
            }
            Self::Core(e) => e.is_client_error(),
            _ => false,
        }
    }
}
