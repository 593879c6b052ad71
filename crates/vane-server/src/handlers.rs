use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use vane_core::Application;
use vane_engine::EngineError;

use crate::state::AppState;

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "Vane Controller",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let body = json!({
        "status": "ready",
        "observer": state.observer.state().to_string(),
        "applications": state.scheduler.context().store.len(),
    });
    (StatusCode::OK, Json(body))
}

/// One row of the application listing.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AppSummary {
    name: String,
    sync: Value,
    health: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    revision: Option<String>,
}

pub async fn list_applications(State(state): State<AppState>) -> impl IntoResponse {
    let mut rows = Vec::new();
    for entry in state.scheduler.context().store.list() {
        let status = entry.current_status().await;
        rows.push(AppSummary {
            name: entry.name().to_string(),
            sync: json!(status.sync),
            health: json!(status.health),
            revision: status.revision,
        });
    }
    (StatusCode::OK, Json(rows))
}

pub async fn register_application(
    State(state): State<AppState>,
    Json(app): Json<Application>,
) -> impl IntoResponse {
    let name = app.name.clone();
    match state.scheduler.register(app) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(json!({"name": name, "status": "registered"})),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub async fn get_application(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let entry = match state.scheduler.context().store.get(&name) {
        Ok(entry) => entry,
        Err(error) => return error_response(error),
    };
    let declaration = entry.declaration().await;
    let status = entry.current_status().await;
    let history: Vec<Value> = entry
        .history
        .read()
        .await
        .entries()
        .into_iter()
        .map(|(index, snapshot)| {
            json!({
                "index": index,
                "revision": snapshot.revision,
                "resourceCount": snapshot.resources.len(),
                "recordedAt": json!(snapshot.recorded_at
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_default()),
            })
        })
        .collect();
    let live = state.observer.snapshot(&name);

    let body = json!({
        "application": declaration,
        "status": status,
        "history": history,
        "live": {
            "resources": live.len(),
            "cacheAgeMs": live.age().as_millis() as u64,
        },
    });
    (StatusCode::OK, Json(body)).into_response()
}

#[derive(Deserialize)]
pub struct DeregisterQuery {
    #[serde(default)]
    pub cascade: bool,
}

pub async fn deregister_application(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DeregisterQuery>,
) -> impl IntoResponse {
    match state.scheduler.deregister(&name, query.cascade).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub async fn sync_application(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.scheduler.trigger_sync(&name) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({"name": name, "status": "sync scheduled"})),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    pub revision_index: usize,
}

pub async fn rollback_application(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RollbackRequest>,
) -> impl IntoResponse {
    match state.scheduler.rollback(&name, request.revision_index).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "name": name,
                "status": "rollback scheduled",
                "revisionIndex": request.revision_index,
            })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

fn error_response(error: EngineError) -> axum::response::Response {
    let status = match &error {
        EngineError::AppNotFound { .. } | EngineError::RevisionNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        EngineError::AppExists { .. } => StatusCode::CONFLICT,
        EngineError::Core(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": error.to_string()}))).into_response()
}
