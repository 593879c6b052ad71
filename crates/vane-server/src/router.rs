use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the controller's HTTP surface.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/applications",
            get(handlers::list_applications).post(handlers::register_application),
        )
        .route(
            "/applications/{name}",
            get(handlers::get_application).delete(handlers::deregister_application),
        )
        .route("/applications/{name}/sync", post(handlers::sync_application))
        .route(
            "/applications/{name}/rollback",
            post(handlers::rollback_application),
        );

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
