use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn time_slot_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::create_time_slot))
        .route(
            "/{slot_id}",
            get(handlers::get_time_slot)
                .put(handlers::update_time_slot)
                .delete(handlers::delete_time_slot),
        )
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_time_slots))
        .route(
            "/doctors/{doctor_id}/available",
            get(handlers::get_bookable_times),
        )
        .with_state(state)
}
