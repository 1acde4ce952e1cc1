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

use crate::models::{AvailabilityError, CreateTimeSlotRequest, UpdateTimeSlotRequest};
use crate::services::availability::AvailabilityService;

#[derive(Debug, Deserialize)]
pub struct BookableTimesQuery {
    pub date: NaiveDate,
}

fn map_availability_error(e: AvailabilityError) -> AppError {
    match e {
        AvailabilityError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
        AvailabilityError::SlotNotFound => AppError::NotFound("Time slot not found".to_string()),
        AvailabilityError::InvalidTimeRange(msg) => AppError::BadRequest(msg),
        AvailabilityError::InvalidDuration(msg) => AppError::BadRequest(msg),
        AvailabilityError::SlotOverlap { day, start, end } => AppError::Conflict(format!(
            "Time slot overlaps an existing window on {} ({}-{})",
            day, start, end
        )),
        AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn create_time_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateTimeSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);

    let slot = service
        .create_time_slot(request, auth.token())
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!(slot)))
}

#[axum::debug_handler]
pub async fn get_time_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);

    let slot = service
        .get_time_slot(slot_id, auth.token())
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!(slot)))
}

#[axum::debug_handler]
pub async fn update_time_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(slot_id): Path<Uuid>,
    Json(request): Json<UpdateTimeSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);

    let slot = service
        .update_time_slot(slot_id, request, auth.token())
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!(slot)))
}

#[axum::debug_handler]
pub async fn delete_time_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);

    service
        .delete_time_slot(slot_id, auth.token())
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({ "deleted": slot_id })))
}

#[axum::debug_handler]
pub async fn get_doctor_time_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);

    let slots = service
        .get_time_slots_for_doctor(doctor_id, auth.token())
        .await
        .map_err(map_availability_error)?;

    let total = slots.len();
    Ok(Json(json!({
        "time_slots": slots,
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
    let service = AvailabilityService::new(&state);

    let times = service
        .bookable_times_for_date(doctor_id, query.date, auth.token())
        .await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "times": times
    })))
}
