//! The reconciliation engine: diffing, plan execution, application state and
//! scheduling.
//!
//! One cycle runs resolve → compile → diff → apply → evaluate, always under
//! the application's own lock. The scheduler drives periodic cycles across a
//! bounded worker pool and turns observed drift into immediate triggers for
//! self-healing applications.

pub mod diff;
pub mod error;
pub mod history;
pub mod reconciler;
pub mod scheduler;
pub mod store;
pub mod sync;

pub use diff::{diff, ActionKind, Plan, PlanAction};
pub use error::EngineError;
pub use history::{RevisionHistory, RevisionSnapshot};
pub use reconciler::{CycleTrigger, ReconcileContext, ReconcileSettings};
pub use scheduler::Scheduler;
pub use store::{AppEntry, AppStore};
pub use sync::{ActionFailure, ExecutorSettings, SyncExecutor, SyncResult};
