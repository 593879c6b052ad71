//! HTTP server for the Vane controller.
//!
//! Exposes the query interface (list applications, full status, manual
//! resync, rollback) plus liveness and readiness endpoints, and owns process
//! bootstrap: configuration, observability, engine wiring, background tasks.

pub mod bootstrap;
pub mod handlers;
pub mod observability;
pub mod router;
pub mod state;

pub use bootstrap::{bootstrap, Runtime};
pub use router::build_router;
pub use state::AppState;
