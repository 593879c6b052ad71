//! Process wiring: configuration in, running engine out.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::info;
use vane_cluster::{InMemoryCluster, LiveStateObserver};
use vane_config::ControllerConfig;
use vane_core::EventBroadcaster;
use vane_engine::{
    AppStore, ExecutorSettings, ReconcileContext, ReconcileSettings, Scheduler, SyncExecutor,
};
use vane_source::DirSourceRepository;

use crate::state::AppState;

/// The wired controller plus its background tasks.
pub struct Runtime {
    pub state: AppState,
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Stops the background tasks. In-flight apply actions are not
    /// interrupted mid-request; the tasks stop at their next await point.
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Builds the engine from configuration and starts the observer and
/// scheduler tasks.
///
/// The target environment behind the capability trait is the in-process
/// store; the source repository is the configured directory tree.
pub fn bootstrap(config: &ControllerConfig) -> Runtime {
    let cluster = Arc::new(InMemoryCluster::new());
    let source = Arc::new(DirSourceRepository::new(&config.source.root));
    let events = EventBroadcaster::new_shared();
    let observer = LiveStateObserver::new(cluster.clone(), events.clone());

    let executor = Arc::new(SyncExecutor::new(
        cluster.clone(),
        ExecutorSettings {
            retry_limit: config.controller.apply_retry_limit,
            retry_base_delay: Duration::from_millis(config.controller.apply_retry_base_delay_ms),
            ..ExecutorSettings::default()
        },
    ));

    let ctx = ReconcileContext {
        store: Arc::new(AppStore::new()),
        source,
        backend: cluster,
        observer: observer.clone(),
        executor,
        events,
        settings: ReconcileSettings {
            source_retry_limit: config.controller.source_retry_limit,
            ..ReconcileSettings::default()
        },
    };

    let scheduler = Scheduler::new(
        ctx,
        Duration::from_secs(config.controller.reconcile_interval_secs),
        config.controller.max_concurrent_reconciles,
    );

    let tasks = vec![
        tokio::spawn(observer.clone().run()),
        tokio::spawn(scheduler.clone().run()),
    ];
    info!(
        source_root = %config.source.root.display(),
        interval_secs = config.controller.reconcile_interval_secs,
        workers = config.controller.max_concurrent_reconciles,
        "Controller engine started"
    );

    Runtime {
        state: AppState {
            scheduler,
            observer,
            started_at: OffsetDateTime::now_utc(),
        },
        tasks,
    }
}
