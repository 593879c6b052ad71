//! Scheduling and the public engine operations.
//!
//! One long-lived scheduler task drives periodic cycles for every registered
//! application and turns observed drift into immediate triggers when
//! self-heal is enabled. Cycles run across a bounded worker pool; the
//! per-application serialization itself lives in
//! [`ReconcileContext::reconcile`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use vane_core::{Application, ControllerEvent, ResourceChanged};

use crate::diff::diff;
use crate::error::EngineError;
use crate::reconciler::{CycleTrigger, ReconcileContext};
use crate::store::AppEntry;

/// Drives reconciliation and exposes the engine's operations.
pub struct Scheduler {
    ctx: ReconcileContext,
    interval: Duration,
    workers: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(ctx: ReconcileContext, interval: Duration, max_concurrent: usize) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            interval,
            workers: Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }

    pub fn context(&self) -> &ReconcileContext {
        &self.ctx
    }

    /// Registers a declaration and schedules its first cycle.
    ///
    /// # Errors
    ///
    /// Propagates validation and name-collision errors; a rejected
    /// declaration never enters the scheduler.
    pub fn register(&self, app: Application) -> Result<Arc<AppEntry>, EngineError> {
        let name = app.name.clone();
        let entry = self.ctx.store.register(app)?;
        info!(app = %name, "Application registered");
        self.spawn_cycle(entry.clone(), CycleTrigger::Periodic);
        Ok(entry)
    }

    /// Deregisters an application, optionally deleting everything it owns.
    ///
    /// The cascade runs as one final prune-everything plan through the
    /// normal executor, so ownership checks and propagation semantics still
    /// apply. When the cascade fails the entry stays registered so the
    /// request can be retried.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::AppNotFound` for an unknown name and a cluster
    /// error when cascade deletion fails.
    pub async fn deregister(&self, name: &str, cascade: bool) -> Result<(), EngineError> {
        let entry = self.ctx.store.get(name)?;
        // wait out any in-flight cycle; nothing new starts without the entry
        let _guard = entry.cycle_lock.lock().await;

        if cascade {
            let app = entry.declaration().await;
            if let Err(error) = self.ctx.observer.refresh().await {
                warn!(app = %name, error = %error, "Resync before cascade failed");
            }
            let live = self.ctx.observer.snapshot(name);
            let mut policy = app.sync_policy.clone();
            policy.prune = true;
            let plan = diff(name, None, &[], &live, &policy);
            let result = self.ctx.executor.apply(&plan, &policy).await;
            if !result.fully_succeeded() {
                return Err(EngineError::Cluster(vane_cluster::ClusterError::internal(
                    result
                        .failure_message()
                        .unwrap_or_else(|| "cascade deletion failed".to_string()),
                )));
            }
            info!(app = %name, pruned = result.pruned.len(), "Cascade deletion finished");
        }

        self.ctx.store.remove(name)?;
        info!(app = %name, "Application deregistered");
        Ok(())
    }

    /// Triggers a manual resync.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::AppNotFound` for an unknown name.
    pub fn trigger_sync(&self, name: &str) -> Result<(), EngineError> {
        let entry = self.ctx.store.get(name)?;
        self.spawn_cycle(entry, CycleTrigger::Manual);
        Ok(())
    }

    /// Schedules a rollback to the snapshot at `index`.
    ///
    /// The stored resource set is re-injected as the desired state for one
    /// cycle, bypassing resolve and compile; the cycle records the outcome
    /// as a new snapshot so history keeps moving forward.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::RevisionNotFound` when the index was evicted or
    /// never recorded; the failure is local to this request.
    pub async fn rollback(&self, name: &str, index: usize) -> Result<(), EngineError> {
        let entry = self.ctx.store.get(name)?;
        let snapshot = entry.history.read().await.get(index)?;
        info!(app = %name, index, revision = %snapshot.revision, "Rollback scheduled");
        entry.set_rollback_target(snapshot);
        self.spawn_cycle(entry, CycleTrigger::Rollback);
        Ok(())
    }

    /// Runs the scheduling loop until the task is cancelled.
    pub async fn run(self: Arc<Self>) {
        let mut events = self.ctx.events.subscribe();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for entry in self.ctx.store.list() {
                        self.spawn_cycle(entry, CycleTrigger::Periodic);
                    }
                }
                event = events.recv() => match event {
                    Ok(ControllerEvent::Resource(changed)) => {
                        self.handle_resource_change(changed).await;
                    }
                    Ok(ControllerEvent::Status(_)) => {}
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "Scheduler lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => return,
                },
            }
        }
    }

    /// Live drift outside a cycle is an immediate trigger for self-healing
    /// applications, regardless of the polling interval.
    async fn handle_resource_change(&self, event: ResourceChanged) {
        let Some(owner) = event.owner else { return };
        let Ok(entry) = self.ctx.store.get(&owner) else {
            return;
        };
        let app = entry.declaration().await;
        if app.sync_policy.self_heal {
            debug!(app = %owner, resource = %event.id, "Drift observed, triggering cycle");
            self.spawn_cycle(entry, CycleTrigger::Drift);
        }
    }

    fn spawn_cycle(&self, entry: Arc<AppEntry>, trigger: CycleTrigger) {
        let ctx = self.ctx.clone();
        let workers = self.workers.clone();
        tokio::spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            ctx.reconcile(&entry, trigger).await;
        });
    }
}
