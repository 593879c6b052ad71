use std::sync::Arc;

use time::OffsetDateTime;
use vane_cluster::LiveStateObserver;
use vane_engine::Scheduler;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub observer: Arc<LiveStateObserver>,
    pub started_at: OffsetDateTime,
}
