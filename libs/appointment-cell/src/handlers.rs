use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AvailabilityCheckQuery, CancelAppointmentRequest, CreateAppointmentRequest,
    MoveAppointmentRequest, UpdateAppointmentRequest, DEFAULT_APPOINTMENT_DURATION_MINUTES,
};
use crate::services::booking::AppointmentBookingService;

#[derive(Debug, Deserialize)]
pub struct BookableTimesQuery {
    pub date: NaiveDate,
}

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
        AppointmentError::SlotTaken { .. } => AppError::Conflict(e.to_string()),
        AppointmentError::InvalidTime(msg) => AppError::BadRequest(msg),
        AppointmentError::TerminalState(_) => AppError::BadRequest(e.to_string()),
        AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(e.to_string()),
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointment = service
        .create_appointment(request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointment = service
        .update_appointment(appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointment = service
        .cancel_appointment(appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn move_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<MoveAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointment = service
        .move_appointment(appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointments = service
        .appointments_for_patient(patient_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    let total = appointments.len();
    Ok(Json(json!({
        "appointments": appointments,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let appointments = service
        .appointments_for_doctor(doctor_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    let total = appointments.len();
    Ok(Json(json!({
        "appointments": appointments,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn get_bookable_times(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<BookableTimesQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let times = service
        .bookable_times_for_date(doctor_id, query.date, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "times": times
    })))
}

#[axum::debug_handler]
pub async fn check_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<AvailabilityCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&state);

    let duration = query
        .duration_minutes
        .unwrap_or(DEFAULT_APPOINTMENT_DURATION_MINUTES);
    let available = service
        .is_slot_available(query.doctor_id, query.scheduled_at, duration, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "doctor_id": query.doctor_id,
        "scheduled_at": query.scheduled_at,
        "available": available
    })))
}
