//! In-memory target environment.
//!
//! Backs tests and the in-process demo environment. Behaves like a small
//! resource store: it stamps server-managed metadata on apply, enforces
//! namespace existence, tracks per-resource health, and broadcasts change
//! events to watchers. Failure injection hooks let tests exercise the sync
//! executor's retry and partial-failure paths.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use vane_core::app::PropagationMode;
use vane_core::{HealthStatusCode, Manifest, ResourceId};

use crate::backend::{ClusterBackend, ClusterChange, ClusterWatch};
use crate::error::ClusterError;

use async_trait::async_trait;
use serde_json::Value;

/// Buffer size for the change broadcast channel.
const WATCH_BUFFER_SIZE: usize = 256;

/// In-memory resource store implementing [`ClusterBackend`].
pub struct InMemoryCluster {
    data: DashMap<ResourceId, Manifest>,
    namespaces: DashMap<String, OffsetDateTime>,
    health: DashMap<ResourceId, HealthStatusCode>,
    rejections: DashMap<ResourceId, String>,
    rate_limit_budget: AtomicU32,
    version_counter: AtomicU64,
    watch_tx: broadcast::Sender<ClusterChange>,
}

impl InMemoryCluster {
    /// Creates an empty environment with a `default` namespace.
    pub fn new() -> Self {
        let (watch_tx, _) = broadcast::channel(WATCH_BUFFER_SIZE);
        let cluster = Self {
            data: DashMap::new(),
            namespaces: DashMap::new(),
            health: DashMap::new(),
            rejections: DashMap::new(),
            rate_limit_budget: AtomicU32::new(0),
            version_counter: AtomicU64::new(1),
            watch_tx,
        };
        cluster
            .namespaces
            .insert("default".to_string(), OffsetDateTime::now_utc());
        cluster
    }

    fn next_version(&self) -> String {
        self.version_counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }

    /// Overrides the probed health of one resource.
    pub fn set_health(&self, id: ResourceId, health: HealthStatusCode) {
        self.health.insert(id, health);
    }

    /// Makes every apply of `id` fail validation with `message`.
    pub fn reject_apply(&self, id: ResourceId, message: impl Into<String>) {
        self.rejections.insert(id, message.into());
    }

    /// Makes the next `count` mutating calls fail with a rate-limit error.
    pub fn induce_rate_limit(&self, count: u32) {
        self.rate_limit_budget.store(count, Ordering::SeqCst);
    }

    /// Writes a resource directly, bypassing validation and namespace
    /// checks. Simulates an out-of-band edit: a change event is still
    /// broadcast so the observer sees the drift.
    pub fn inject_resource(&self, manifest: Manifest) {
        if let Ok(id) = manifest.id() {
            self.data.insert(id, manifest.clone());
            let _ = self.watch_tx.send(ClusterChange::Applied { manifest });
        }
    }

    /// Number of stored resources, owned or not.
    pub fn resource_count(&self) -> usize {
        self.data.len()
    }

    fn consume_rate_limit(&self) -> Result<(), ClusterError> {
        let remaining = self.rate_limit_budget.load(Ordering::SeqCst);
        if remaining > 0 {
            self.rate_limit_budget.fetch_sub(1, Ordering::SeqCst);
            return Err(ClusterError::rate_limited(
                "environment is shedding load, retry later",
            ));
        }
        Ok(())
    }

    fn remove_one(&self, id: &ResourceId) -> Result<(), ClusterError> {
        let (_, manifest) = self
            .data
            .remove(id)
            .ok_or_else(|| ClusterError::not_found(id.clone()))?;
        self.health.remove(id);
        let _ = self.watch_tx.send(ClusterChange::Deleted {
            id: id.clone(),
            owner: manifest.owner().map(str::to_string),
        });
        Ok(())
    }

    fn dependents_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        self.data
            .iter()
            .filter(|entry| entry.value().owner_references().contains(id))
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Stamps the metadata fields a real environment maintains server-side.
fn stamp_metadata(manifest: &mut Manifest, version: String, existing: Option<&Manifest>) {
    let now = OffsetDateTime::now_utc();
    let uid = existing
        .and_then(|m| {
            m.as_value()
                .pointer("/metadata/uid")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let created = existing
        .and_then(|m| {
            m.as_value()
                .pointer("/metadata/creationTimestamp")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            now.format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default()
        });

    if let Some(metadata) = manifest
        .as_value_mut()
        .pointer_mut("/metadata")
        .and_then(Value::as_object_mut)
    {
        metadata.insert("uid".to_string(), Value::String(uid));
        metadata.insert("resourceVersion".to_string(), Value::String(version));
        metadata.insert("creationTimestamp".to_string(), Value::String(created));
    }
}

#[async_trait]
impl ClusterBackend for InMemoryCluster {
    async fn list_resources(&self, owner: Option<&str>) -> Result<Vec<Manifest>, ClusterError> {
        let mut resources: Vec<(ResourceId, Manifest)> = self
            .data
            .iter()
            .filter(|entry| match owner {
                Some(owner) => entry.value().owner() == Some(owner),
                None => entry.value().owner().is_some(),
            })
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        resources.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(resources.into_iter().map(|(_, m)| m).collect())
    }

    async fn watch_resources(&self, owner: Option<&str>) -> Result<ClusterWatch, ClusterError> {
        Ok(ClusterWatch::new(
            self.watch_tx.subscribe(),
            owner.map(str::to_string),
        ))
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, ClusterError> {
        Ok(self.namespaces.contains_key(name))
    }

    async fn create_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.consume_rate_limit()?;
        self.namespaces
            .entry(name.to_string())
            .or_insert_with(OffsetDateTime::now_utc);
        Ok(())
    }

    async fn apply_resource(&self, manifest: &Manifest) -> Result<Manifest, ClusterError> {
        self.consume_rate_limit()?;

        let id = manifest.id().map_err(|e| {
            ClusterError::validation(
                ResourceId::new(manifest.kind(), "", manifest.name()),
                e.to_string(),
            )
        })?;

        if manifest.owner().is_none() {
            return Err(ClusterError::validation(
                id,
                "resource carries no ownership marker",
            ));
        }

        if let Some(rejection) = self.rejections.get(&id) {
            return Err(ClusterError::validation(id.clone(), rejection.clone()));
        }

        if !self.namespaces.contains_key(&id.namespace) {
            return Err(ClusterError::namespace_missing(&id.namespace));
        }

        let existing = self.data.get(&id).map(|e| e.value().clone());
        let mut stored = manifest.clone();
        stamp_metadata(&mut stored, self.next_version(), existing.as_ref());

        self.data.insert(id.clone(), stored.clone());
        self.health.entry(id).or_insert(HealthStatusCode::Healthy);
        let _ = self.watch_tx.send(ClusterChange::Applied {
            manifest: stored.clone(),
        });
        Ok(stored)
    }

    async fn delete_resource(
        &self,
        id: &ResourceId,
        propagation: PropagationMode,
    ) -> Result<(), ClusterError> {
        self.consume_rate_limit()?;

        if !self.data.contains_key(id) {
            return Err(ClusterError::not_found(id.clone()));
        }

        if propagation == PropagationMode::Foreground {
            // Dependents go first; repeat until the dependency closure is
            // drained, then remove the parent.
            loop {
                let dependents = self.dependents_of(id);
                if dependents.is_empty() {
                    break;
                }
                for dependent in dependents {
                    // A dependent may have its own dependents.
                    self.delete_resource(&dependent, propagation).await?;
                }
            }
        }

        self.remove_one(id)
    }

    async fn resource_health(&self, id: &ResourceId) -> Result<HealthStatusCode, ClusterError> {
        if !self.data.contains_key(id) {
            return Ok(HealthStatusCode::Missing);
        }
        Ok(self
            .health
            .get(id)
            .map(|h| *h.value())
            .unwrap_or(HealthStatusCode::Unknown))
    }
}
