//! Live-state observation.
//!
//! A background task keeps a cache of every owned resource in the target
//! environment, driven by a watch subscription with an explicit connection
//! state machine: `Connected` while consuming events, `Reconnecting` with
//! bounded exponential backoff after a failure, `Resyncing` while replacing
//! the cache with a full list. Missed events (a lagged watch) always force a
//! full resync; partial event history is never trusted.
//!
//! Snapshots are published through an atomic pointer swap, so readers never
//! block on the watch task and always see a consistent point-in-time view.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use vane_core::{ChangeKind, EventBroadcaster, Manifest, ResourceId};

use crate::backend::{ClusterBackend, ClusterChange};
use crate::error::ClusterError;

/// Initial reconnect delay.
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Ceiling for the reconnect delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Connection state of the observer's watch subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    Connected,
    Reconnecting,
    Resyncing,
}

impl fmt::Display for ObserverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Resyncing => write!(f, "resyncing"),
        }
    }
}

/// A point-in-time view of live state.
#[derive(Debug, Clone)]
pub struct LiveSnapshot {
    resources: BTreeMap<ResourceId, Manifest>,
    taken_at: OffsetDateTime,
}

impl LiveSnapshot {
    fn new(resources: BTreeMap<ResourceId, Manifest>) -> Self {
        Self {
            resources,
            taken_at: OffsetDateTime::now_utc(),
        }
    }

    fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Manifest> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &Manifest)> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// When this view was last updated.
    pub fn taken_at(&self) -> OffsetDateTime {
        self.taken_at
    }

    /// How stale this view is right now.
    pub fn age(&self) -> Duration {
        let age = OffsetDateTime::now_utc() - self.taken_at;
        age.try_into().unwrap_or(Duration::ZERO)
    }

    /// The subset owned by one application.
    #[must_use]
    pub fn scoped(&self, owner: &str) -> LiveSnapshot {
        Self {
            resources: self
                .resources
                .iter()
                .filter(|(_, m)| m.owner() == Some(owner))
                .map(|(id, m)| (id.clone(), m.clone()))
                .collect(),
            taken_at: self.taken_at,
        }
    }
}

/// Maintains the live-state cache for the whole controller.
pub struct LiveStateObserver {
    backend: Arc<dyn ClusterBackend>,
    events: Arc<EventBroadcaster>,
    cache: ArcSwap<LiveSnapshot>,
    state: RwLock<ObserverState>,
}

impl LiveStateObserver {
    pub fn new(backend: Arc<dyn ClusterBackend>, events: Arc<EventBroadcaster>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            events,
            cache: ArcSwap::from_pointee(LiveSnapshot::empty()),
            state: RwLock::new(ObserverState::Resyncing),
        })
    }

    /// Current cache contents scoped to one application.
    ///
    /// Never blocks; the returned view may be stale while the observer is
    /// reconnecting, which is visible through [`LiveSnapshot::age`].
    pub fn snapshot(&self, app: &str) -> LiveSnapshot {
        self.cache.load().scoped(app)
    }

    /// Current cache contents across all applications.
    pub fn full_snapshot(&self) -> Arc<LiveSnapshot> {
        self.cache.load_full()
    }

    pub fn state(&self) -> ObserverState {
        *self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ObserverState) {
        let mut guard = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *guard != state {
            debug!(state = %state, "Observer state changed");
            *guard = state;
        }
    }

    /// Replaces the cache with a full list of owned resources.
    ///
    /// # Errors
    ///
    /// Propagates the backend's list failure; the previous cache stays
    /// published.
    pub async fn refresh(&self) -> Result<(), ClusterError> {
        let listed = self.backend.list_resources(None).await?;
        let mut resources = BTreeMap::new();
        for manifest in listed {
            if let Ok(id) = manifest.id() {
                resources.insert(id, manifest);
            }
        }
        let count = resources.len();
        self.cache.store(Arc::new(LiveSnapshot::new(resources)));
        debug!(resources = count, "Live-state cache resynced");
        Ok(())
    }

    /// Runs the watch loop until the task is cancelled.
    ///
    /// Subscribes before listing so no change between the two is lost, then
    /// folds events into the cache and republishes after every change.
    pub async fn run(self: Arc<Self>) {
        let mut backoff = BASE_BACKOFF;
        loop {
            self.set_state(ObserverState::Resyncing);
            let mut watch = match self.backend.watch_resources(None).await {
                Ok(watch) => watch,
                Err(error) => {
                    warn!(error = %error, "Failed to establish watch");
                    self.backoff_wait(&mut backoff).await;
                    continue;
                }
            };
            if let Err(error) = self.refresh().await {
                warn!(error = %error, "Full resync failed");
                self.backoff_wait(&mut backoff).await;
                continue;
            }

            backoff = BASE_BACKOFF;
            self.set_state(ObserverState::Connected);
            info!("Live-state observer connected");

            loop {
                match watch.recv().await {
                    Ok(change) => self.apply_change(change),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Watch lagged, forcing full resync");
                        break;
                    }
                    Err(RecvError::Closed) => {
                        warn!("Watch stream closed");
                        self.backoff_wait(&mut backoff).await;
                        break;
                    }
                }
            }
        }
    }

    async fn backoff_wait(&self, backoff: &mut Duration) {
        self.set_state(ObserverState::Reconnecting);
        tokio::time::sleep(*backoff).await;
        *backoff = (*backoff * 2).min(MAX_BACKOFF);
    }

    fn apply_change(&self, change: ClusterChange) {
        let current = self.cache.load();
        let mut resources = current.resources.clone();
        match &change {
            ClusterChange::Applied { manifest } => {
                // only owned resources belong in the cache
                if manifest.owner().is_none() {
                    return;
                }
                let Ok(id) = manifest.id() else { return };
                resources.insert(id.clone(), manifest.clone());
                self.events.send_resource_changed(
                    manifest.owner().map(str::to_string),
                    id,
                    ChangeKind::Applied,
                );
            }
            ClusterChange::Deleted { id, owner } => {
                if resources.remove(id).is_none() && owner.is_none() {
                    return;
                }
                self.events
                    .send_resource_changed(owner.clone(), id.clone(), ChangeKind::Deleted);
            }
        }
        self.cache.store(Arc::new(LiveSnapshot::new(resources)));
    }
}
