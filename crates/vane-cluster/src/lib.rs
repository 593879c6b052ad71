//! Target environment interface and live-state observation.
//!
//! The target environment is an opaque resource store reached through the
//! [`ClusterBackend`] capability trait; the controller never assumes
//! anything about what runs behind it. [`InMemoryCluster`] is the built-in
//! backend used by tests and the in-process demo environment.
//! [`LiveStateObserver`] maintains the continuously updated live-state cache
//! every reconciliation cycle diffs against.

pub mod backend;
pub mod error;
pub mod memory;
pub mod observer;

pub use backend::{ClusterBackend, ClusterChange, ClusterWatch};
pub use error::ClusterError;
pub use memory::InMemoryCluster;
pub use observer::{LiveSnapshot, LiveStateObserver, ObserverState};
