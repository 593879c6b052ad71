//! One reconciliation cycle: resolve → compile → diff → apply → evaluate.
//!
//! Cycles for one application are strictly serialized through the entry's
//! cycle lock; triggers arriving mid-cycle coalesce into a pending flag and
//! run immediately afterwards against fresh desired and live state. An
//! in-flight apply is never aborted by a new trigger.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{info, warn};
use vane_cluster::{ClusterBackend, LiveStateObserver};
use vane_core::app::Application;
use vane_core::{
    AppStatus, EventBroadcaster, HealthStatusCode, Manifest, SyncStatusCode,
};
use vane_overlay::{compile, CompileParams};
use vane_source::{SourceError, SourceRepository, SourceTree};

use crate::diff::diff;
use crate::history::RevisionSnapshot;
use crate::store::{AppEntry, AppStore};
use crate::sync::SyncExecutor;

/// What prompted a reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    /// The periodic scheduler tick.
    Periodic,
    /// Live drift observed while self-heal is enabled.
    Drift,
    /// An explicit resync request.
    Manual,
    /// A rollback request; the desired set comes from history.
    Rollback,
}

impl CycleTrigger {
    /// Manual intervention applies the plan even when `automated` is off.
    pub fn forces_apply(self) -> bool {
        matches!(self, Self::Manual | Self::Rollback)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Periodic => "periodic",
            Self::Drift => "drift",
            Self::Manual => "manual",
            Self::Rollback => "rollback",
        }
    }

    /// Coalescing priority; a stronger trigger is never downgraded.
    pub(crate) fn strength(self) -> u8 {
        match self {
            Self::Periodic => 1,
            Self::Drift => 2,
            Self::Manual => 3,
            Self::Rollback => 4,
        }
    }

    pub(crate) fn from_strength(strength: u8) -> Option<Self> {
        match strength {
            1 => Some(Self::Periodic),
            2 => Some(Self::Drift),
            3 => Some(Self::Manual),
            4 => Some(Self::Rollback),
            _ => None,
        }
    }
}

/// Bounds for the cycle's own retry loops.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Attempts per source fetch before the cycle gives up.
    pub source_retry_limit: u32,
    /// Delay before the second fetch attempt; doubles per attempt.
    pub source_retry_base_delay: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            source_retry_limit: 3,
            source_retry_base_delay: Duration::from_millis(200),
        }
    }
}

/// Shared dependencies of every reconciliation cycle.
#[derive(Clone)]
pub struct ReconcileContext {
    pub store: Arc<AppStore>,
    pub source: Arc<dyn SourceRepository>,
    pub backend: Arc<dyn ClusterBackend>,
    pub observer: Arc<LiveStateObserver>,
    pub executor: Arc<SyncExecutor>,
    pub events: Arc<EventBroadcaster>,
    pub settings: ReconcileSettings,
}

impl ReconcileContext {
    /// Reconciles one application, coalescing triggers that arrive while a
    /// cycle is in flight.
    ///
    /// The pending flag is set first, then the cycle lock is tried: if
    /// another cycle holds it, that cycle drains the flag when it finishes,
    /// so a trigger is never lost and never spawns a second concurrent
    /// cycle.
    pub async fn reconcile(&self, entry: &Arc<AppEntry>, trigger: CycleTrigger) {
        entry.mark_pending(trigger);
        loop {
            let Ok(guard) = entry.cycle_lock.try_lock() else {
                return;
            };
            while let Some(pending) = entry.take_pending() {
                self.run_cycle(entry, pending).await;
            }
            drop(guard);
            // a trigger may land between the last drain and the unlock
            if !entry.has_pending() {
                return;
            }
        }
    }

    async fn run_cycle(&self, entry: &Arc<AppEntry>, trigger: CycleTrigger) {
        let app = entry.declaration().await;
        let name = app.name.clone();
        info!(app = %name, trigger = trigger.as_str(), "Reconciliation cycle started");

        self.update_status(entry, |status| {
            status.sync = SyncStatusCode::Progressing;
            status.last_cycle_at = Some(OffsetDateTime::now_utc());
        })
        .await;

        // Desired state: a pending rollback bypasses resolve and compile.
        let (revision, desired) = match entry.take_rollback_target() {
            Some(snapshot) => (snapshot.revision.clone(), snapshot.resources.clone()),
            None => {
                let tree = match self.resolve_with_retry(&app).await {
                    Ok(tree) => tree,
                    Err(error) => {
                        warn!(app = %name, error = %error, "Source fetch failed");
                        self.update_status(entry, |status| {
                            status.sync = SyncStatusCode::OutOfSync;
                            status.message = Some(format!("source fetch failed: {error}"));
                        })
                        .await;
                        return;
                    }
                };
                let params = CompileParams {
                    owner: &name,
                    default_namespace: &app.destination.namespace,
                    allow_empty: app.sync_policy.allow_empty,
                };
                match compile(&tree, &app.source.path, &params) {
                    Ok(resources) => (tree.revision().to_string(), resources),
                    Err(error) => {
                        warn!(app = %name, error = %error, "Compilation failed");
                        self.update_status(entry, |status| {
                            status.sync = SyncStatusCode::Degraded;
                            status.message = Some(format!("compile failed: {error}"));
                        })
                        .await;
                        return;
                    }
                }
            }
        };

        // One consistent live snapshot for the whole plan; a failed resync
        // falls back to the cache, which only means a staler view.
        if let Err(error) = self.observer.refresh().await {
            warn!(app = %name, error = %error, "Live-state resync failed, using cached view");
        }
        let live = self.observer.snapshot(&name);
        let plan = diff(&name, Some(revision.clone()), &desired, &live, &app.sync_policy);
        let mut summary = plan.summary();
        let drift_note = plan
            .has_drift()
            .then(|| format!("{} resource(s) drifted, prune disabled", summary.drifted));

        if !app.sync_policy.automated && !trigger.forces_apply() {
            // computed but not applied
            let health = self.evaluate_health(&desired).await;
            let sync = if plan.has_changes() {
                SyncStatusCode::OutOfSync
            } else if health == HealthStatusCode::Unhealthy {
                SyncStatusCode::Degraded
            } else {
                SyncStatusCode::Synced
            };
            self.update_status(entry, |status| {
                status.sync = sync;
                status.health = health;
                status.revision = Some(revision.clone());
                status.last_plan = Some(summary);
                status.message = drift_note.clone();
            })
            .await;
            info!(app = %name, sync = %sync, "Cycle finished without apply");
            return;
        }

        let result = self.executor.apply(&plan, &app.sync_policy).await;
        summary.failed = result.failed.len();

        if result.fully_succeeded() {
            self.record_snapshot(entry, &revision, &desired).await;
        }

        // Residual diff: a fully applied plan must leave nothing to do.
        if let Err(error) = self.observer.refresh().await {
            warn!(app = %name, error = %error, "Post-apply resync failed");
        }
        let residual = diff(
            &name,
            None,
            &desired,
            &self.observer.snapshot(&name),
            &app.sync_policy,
        );
        let health = self.evaluate_health(&desired).await;

        let (sync, message) = if !result.fully_succeeded() {
            (SyncStatusCode::Degraded, result.failure_message())
        } else if residual.has_changes() {
            (
                SyncStatusCode::OutOfSync,
                Some("residual drift after apply".to_string()),
            )
        } else if health == HealthStatusCode::Unhealthy {
            (
                SyncStatusCode::Degraded,
                Some("resource health probe failing".to_string()),
            )
        } else {
            (SyncStatusCode::Synced, drift_note)
        };

        self.update_status(entry, |status| {
            status.sync = sync;
            status.health = health;
            status.revision = Some(revision.clone());
            status.last_plan = Some(summary);
            status.message = message.clone();
            if sync == SyncStatusCode::Synced {
                status.last_synced_at = Some(OffsetDateTime::now_utc());
            }
        })
        .await;
        info!(
            app = %name,
            sync = %sync,
            applied = result.applied.len(),
            pruned = result.pruned.len(),
            failed = result.failed.len(),
            "Reconciliation cycle finished"
        );
    }

    async fn resolve_with_retry(&self, app: &Application) -> Result<SourceTree, SourceError> {
        let max_attempts = self.settings.source_retry_limit.max(1);
        let mut attempt = 1u32;
        loop {
            match self.source.resolve(&app.source).await {
                Ok(tree) => return Ok(tree),
                Err(error) if attempt < max_attempts => {
                    let delay = self.settings.source_retry_base_delay * 2u32.pow(attempt - 1);
                    warn!(
                        app = %app.name,
                        error = %error,
                        attempt,
                        "Source fetch failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Worst health across the desired set; an empty set is healthy.
    async fn evaluate_health(&self, desired: &[Manifest]) -> HealthStatusCode {
        let mut health = HealthStatusCode::Healthy;
        for manifest in desired {
            let Ok(id) = manifest.id() else { continue };
            let probed = self
                .backend
                .resource_health(&id)
                .await
                .unwrap_or(HealthStatusCode::Unknown);
            health = health.combine(probed);
        }
        health
    }

    async fn record_snapshot(&self, entry: &Arc<AppEntry>, revision: &str, desired: &[Manifest]) {
        let mut history = entry.history.write().await;
        let duplicate = history
            .latest()
            .map(|latest| latest.revision == revision && latest.resources == desired)
            .unwrap_or(false);
        if !duplicate {
            history.record(RevisionSnapshot::new(revision, desired.to_vec()));
        }
    }

    async fn update_status(&self, entry: &Arc<AppEntry>, update: impl FnOnce(&mut AppStatus)) {
        let (sync, health) = {
            let mut status = entry.status.write().await;
            update(&mut status);
            (status.sync, status.health)
        };
        self.events.send_status_changed(entry.name(), sync, health);
    }
}
