//! Bounded revision history per application.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use vane_core::Manifest;

use crate::error::EngineError;

/// An immutable record of one successfully applied desired state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSnapshot {
    pub id: Uuid,
    /// Concrete revision the resources were compiled from.
    pub revision: String,
    /// The compiled resource set, exactly as applied.
    pub resources: Vec<Manifest>,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl RevisionSnapshot {
    pub fn new(revision: impl Into<String>, resources: Vec<Manifest>) -> Self {
        Self {
            id: Uuid::new_v4(),
            revision: revision.into(),
            resources,
            recorded_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Bounded FIFO of snapshots for one application.
///
/// Indices are absolute since registration and survive eviction, so a
/// rollback request to an evicted revision fails instead of silently hitting
/// a different snapshot.
#[derive(Debug)]
pub struct RevisionHistory {
    app: String,
    snapshots: VecDeque<Arc<RevisionSnapshot>>,
    limit: usize,
    /// Absolute index of the oldest retained snapshot.
    evicted: usize,
}

impl RevisionHistory {
    pub fn new(app: impl Into<String>, limit: usize) -> Self {
        Self {
            app: app.into(),
            snapshots: VecDeque::new(),
            limit,
            evicted: 0,
        }
    }

    /// Appends a snapshot, evicting the oldest entries past the limit.
    /// Returns the absolute index of the new snapshot.
    pub fn record(&mut self, snapshot: RevisionSnapshot) -> usize {
        let index = self.evicted + self.snapshots.len();
        self.snapshots.push_back(Arc::new(snapshot));
        while self.snapshots.len() > self.limit {
            self.snapshots.pop_front();
            self.evicted += 1;
        }
        index
    }

    /// Snapshot at an absolute index.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::RevisionNotFound` when the index was evicted or
    /// never recorded.
    pub fn get(&self, index: usize) -> Result<Arc<RevisionSnapshot>, EngineError> {
        if index < self.evicted {
            return Err(EngineError::revision_not_found(&self.app, index));
        }
        self.snapshots
            .get(index - self.evicted)
            .cloned()
            .ok_or_else(|| EngineError::revision_not_found(&self.app, index))
    }

    /// Most recent snapshot, if any.
    pub fn latest(&self) -> Option<Arc<RevisionSnapshot>> {
        self.snapshots.back().cloned()
    }

    /// Retained snapshots with their absolute indices, oldest first.
    pub fn entries(&self) -> Vec<(usize, Arc<RevisionSnapshot>)> {
        self.snapshots
            .iter()
            .enumerate()
            .map(|(i, s)| (self.evicted + i, s.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
