//! The application store: one entry per registered application.
//!
//! An explicit store object rather than a global registry, so locking is per
//! application: each entry carries its own cycle mutex and pending-trigger
//! flag, and errors in one application's cycle can never leak into another's.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use vane_core::{AppStatus, Application};

use crate::error::EngineError;
use crate::history::{RevisionHistory, RevisionSnapshot};
use crate::reconciler::CycleTrigger;

/// Everything the controller holds for one application.
pub struct AppEntry {
    name: String,
    pub app: RwLock<Application>,
    pub status: RwLock<AppStatus>,
    pub history: RwLock<RevisionHistory>,
    /// Serializes cycles: at most one in flight per application.
    pub cycle_lock: Mutex<()>,
    /// A trigger that arrived mid-cycle, coalesced instead of queued. Holds
    /// the strongest pending trigger so a manual sync is never downgraded.
    pending: AtomicU8,
    /// Desired-state override consumed by the next cycle (rollback).
    rollback_target: StdMutex<Option<Arc<RevisionSnapshot>>>,
}

impl AppEntry {
    fn new(app: Application) -> Arc<Self> {
        let name = app.name.clone();
        let limit = app.sync_policy.revision_history_limit;
        Arc::new(Self {
            history: RwLock::new(RevisionHistory::new(&name, limit)),
            app: RwLock::new(app),
            status: RwLock::new(AppStatus::default()),
            cycle_lock: Mutex::new(()),
            pending: AtomicU8::new(0),
            rollback_target: StdMutex::new(None),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records a trigger, keeping the strongest one seen.
    pub fn mark_pending(&self, trigger: CycleTrigger) {
        self.pending.fetch_max(trigger.strength(), Ordering::SeqCst);
    }

    /// Consumes the pending trigger.
    pub fn take_pending(&self) -> Option<CycleTrigger> {
        CycleTrigger::from_strength(self.pending.swap(0, Ordering::SeqCst))
    }

    /// Whether a trigger is waiting.
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) != 0
    }

    pub fn set_rollback_target(&self, snapshot: Arc<RevisionSnapshot>) {
        let mut guard = self
            .rollback_target
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(snapshot);
    }

    /// Takes the one-shot rollback target, if any.
    pub fn take_rollback_target(&self) -> Option<Arc<RevisionSnapshot>> {
        self.rollback_target
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub async fn declaration(&self) -> Application {
        self.app.read().await.clone()
    }

    pub async fn current_status(&self) -> AppStatus {
        self.status.read().await.clone()
    }
}

/// Registry of application entries.
#[derive(Default)]
pub struct AppStore {
    entries: DashMap<String, Arc<AppEntry>>,
}

impl AppStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a declaration.
    ///
    /// # Errors
    ///
    /// Returns the validation error for a malformed declaration and
    /// `EngineError::AppExists` for a colliding name; neither enters the
    /// scheduler.
    pub fn register(&self, app: Application) -> Result<Arc<AppEntry>, EngineError> {
        app.validate()?;
        match self.entries.entry(app.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(EngineError::app_exists(&app.name)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let entry = AppEntry::new(app);
                slot.insert(entry.clone());
                Ok(entry)
            }
        }
    }

    /// # Errors
    ///
    /// Returns `EngineError::AppNotFound` for an unknown name.
    pub fn get(&self, name: &str) -> Result<Arc<AppEntry>, EngineError> {
        self.entries
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::app_not_found(name))
    }

    /// Removes an entry, returning it for teardown.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::AppNotFound` for an unknown name.
    pub fn remove(&self, name: &str) -> Result<Arc<AppEntry>, EngineError> {
        self.entries
            .remove(name)
            .map(|(_, entry)| entry)
            .ok_or_else(|| EngineError::app_not_found(name))
    }

    /// All entries sorted by name.
    pub fn list(&self) -> Vec<Arc<AppEntry>> {
        let mut entries: Vec<Arc<AppEntry>> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vane_core::app::{DestinationSpec, RevisionPointer, SourceSpec};

    fn app(name: &str) -> Application {
        Application::new(
            name,
            SourceSpec {
                repo: "fixtures/demo".to_string(),
                revision: RevisionPointer::Symbolic("latest".to_string()),
                path: "base".to_string(),
            },
            DestinationSpec {
                environment: "default".to_string(),
                namespace: "demo".to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let store = AppStore::new();
        store.register(app("demo")).unwrap();
        assert!(matches!(
            store.register(app("demo")),
            Err(EngineError::AppExists { .. })
        ));
    }

    #[test]
    fn test_register_rejects_malformed_declarations() {
        let store = AppStore::new();
        let mut bad = app("demo");
        bad.name = "Not A Name".to_string();
        assert!(store.register(bad).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_pending_flag_coalesces_and_keeps_strongest() {
        let store = AppStore::new();
        let entry = store.register(app("demo")).unwrap();
        assert!(entry.take_pending().is_none());

        entry.mark_pending(CycleTrigger::Manual);
        entry.mark_pending(CycleTrigger::Periodic);
        assert_eq!(entry.take_pending(), Some(CycleTrigger::Manual));
        assert!(entry.take_pending().is_none());
    }

    #[test]
    fn test_rollback_target_is_one_shot() {
        let store = AppStore::new();
        let entry = store.register(app("demo")).unwrap();
        entry.set_rollback_target(Arc::new(RevisionSnapshot::new("rev-1", Vec::new())));
        assert!(entry.take_rollback_target().is_some());
        assert!(entry.take_rollback_target().is_none());
    }

    #[test]
    fn test_list_is_sorted() {
        let store = AppStore::new();
        store.register(app("zeta")).unwrap();
        store.register(app("alpha")).unwrap();
        let entries = store.list();
        let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
