use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::create_appointment))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).put(handlers::update_appointment),
        )
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/move", post(handlers::move_appointment))
        .route("/patients/{patient_id}", get(handlers::get_patient_appointments))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_appointments))
        .route(
            "/doctors/{doctor_id}/available",
            get(handlers::get_bookable_times),
        )
        .route("/availability/check", get(handlers::check_availability))
        .with_state(state)
}
