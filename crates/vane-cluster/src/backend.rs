//! The capability trait the controller consumes to reach the target
//! environment.

use async_trait::async_trait;
use tokio::sync::broadcast;
use vane_core::app::PropagationMode;
use vane_core::{HealthStatusCode, Manifest, ResourceId};

use crate::error::ClusterError;

/// One change observed in the target environment.
#[derive(Debug, Clone)]
pub enum ClusterChange {
    Applied { manifest: Manifest },
    Deleted { id: ResourceId, owner: Option<String> },
}

impl ClusterChange {
    /// Owning application recorded on the changed resource, if any.
    pub fn owner(&self) -> Option<&str> {
        match self {
            Self::Applied { manifest } => manifest.owner(),
            Self::Deleted { owner, .. } => owner.as_deref(),
        }
    }

    pub fn id(&self) -> Option<ResourceId> {
        match self {
            Self::Applied { manifest } => manifest.id().ok(),
            Self::Deleted { id, .. } => Some(id.clone()),
        }
    }
}

/// A change subscription, optionally scoped to one owning application.
///
/// Wraps the backend's broadcast stream; receiving applies the owner filter
/// so callers only see changes within their scope.
pub struct ClusterWatch {
    receiver: broadcast::Receiver<ClusterChange>,
    owner: Option<String>,
}

impl ClusterWatch {
    pub fn new(receiver: broadcast::Receiver<ClusterChange>, owner: Option<String>) -> Self {
        Self { receiver, owner }
    }

    /// Next in-scope change.
    ///
    /// # Errors
    ///
    /// Propagates `broadcast::error::RecvError`: `Lagged` means events were
    /// missed and the caller must resync, `Closed` means the stream must be
    /// re-established.
    pub async fn recv(&mut self) -> Result<ClusterChange, broadcast::error::RecvError> {
        loop {
            let change = self.receiver.recv().await?;
            match &self.owner {
                Some(owner) => {
                    if change.owner() == Some(owner.as_str()) {
                        return Ok(change);
                    }
                }
                None => return Ok(change),
            }
        }
    }
}

/// Capability interface of the target environment.
///
/// This is the only surface through which the controller touches live state,
/// and the sync executor is the only component that calls the mutating
/// methods. Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Lists live resources, optionally scoped to one owning application.
    ///
    /// Resources without an ownership marker are never returned; the
    /// controller has no business reading them.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn list_resources(&self, owner: Option<&str>) -> Result<Vec<Manifest>, ClusterError>;

    /// Subscribes to resource changes, optionally scoped to one owner.
    ///
    /// # Errors
    ///
    /// Returns an error when the environment cannot establish the stream.
    async fn watch_resources(&self, owner: Option<&str>) -> Result<ClusterWatch, ClusterError>;

    /// Whether a namespace exists.
    async fn namespace_exists(&self, name: &str) -> Result<bool, ClusterError>;

    /// Creates a namespace. Creating an existing namespace is not an error.
    async fn create_namespace(&self, name: &str) -> Result<(), ClusterError>;

    /// Creates or replaces a resource, returning the stored manifest with
    /// server-managed fields stamped.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::NamespaceMissing` when the target namespace
    /// does not exist, `ClusterError::Validation` when the environment
    /// rejects the manifest, and `ClusterError::RateLimited` when the caller
    /// should back off and retry.
    async fn apply_resource(&self, manifest: &Manifest) -> Result<Manifest, ClusterError>;

    /// Deletes a resource.
    ///
    /// With `PropagationMode::Foreground`, resources that declare the target
    /// as an owner are removed before the target itself.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::NotFound` when the resource does not exist.
    async fn delete_resource(
        &self,
        id: &ResourceId,
        propagation: PropagationMode,
    ) -> Result<(), ClusterError>;

    /// Health of one resource as probed by the environment.
    ///
    /// Returns `Missing` for resources that do not exist and `Unknown` when
    /// the environment cannot tell.
    async fn resource_health(&self, id: &ResourceId) -> Result<HealthStatusCode, ClusterError>;
}
