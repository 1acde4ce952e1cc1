use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::json;

use appointment_cell::router::appointment_routes;
use availability_cell::router::time_slot_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Cabinet scheduling API is running!" }))
        .route("/health", get(health))
        .nest("/api/time-slots", time_slot_routes(state.clone()))
        .nest("/api/appointments", appointment_routes(state.clone()))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
