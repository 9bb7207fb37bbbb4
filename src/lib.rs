pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;
pub mod utils;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::handlers::remote_sync;
use crate::middleware::auth_middleware;
use crate::state::AppState;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "fieldsync" }))
}

/// Operator API. Everything under `/api/remote-sync` requires a platform JWT.
pub fn build_router(state: AppState) -> Router {
    let remote_sync = Router::new()
        .route("/connection", get(remote_sync::test_connection))
        .route(
            "/credentials",
            get(remote_sync::get_credentials).put(remote_sync::save_credentials),
        )
        .route("/preview/:entity", get(remote_sync::preview))
        .route("/import", post(remote_sync::import_all))
        .route("/import/:entity", post(remote_sync::import_entity))
        .route("/runs", get(remote_sync::list_runs))
        .route("/runs/:id", get(remote_sync::get_run))
        .route("/runs/:id/rollback", post(remote_sync::rollback))
        .route("/status", get(remote_sync::status))
        .route("/mappings", get(remote_sync::list_mappings))
        .route("/export/:entity/:local_id", post(remote_sync::export_entity))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health))
        .nest("/api/remote-sync", remote_sync)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
