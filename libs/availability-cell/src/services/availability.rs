use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use directory_cell::models::DirectoryError;
use directory_cell::services::directory::DirectoryService;
use shared_config::AppConfig;
use shared_database::lock::SchedulingLock;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailabilityError, CreateTimeSlotRequest, DayOfWeek, TimeSlot, UpdateTimeSlotRequest,
    DEFAULT_SLOT_DURATION_MINUTES, MAX_SLOT_DURATION_MINUTES, MIN_SLOT_DURATION_MINUTES,
};
use crate::services::overlap::OverlapChecker;
use crate::services::slots;

/// Manages the recurring weekly windows a doctor can be booked in.
pub struct AvailabilityService {
    supabase: SupabaseClient,
    directory: DirectoryService,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            directory: DirectoryService::new(config),
        }
    }

    pub async fn create_time_slot(
        &self,
        request: CreateTimeSlotRequest,
        auth_token: &str,
    ) -> Result<TimeSlot, AvailabilityError> {
        debug!(
            "Creating time slot for doctor {} on {}",
            request.doctor_id, request.day_of_week
        );

        // Existence before business rules: a bad doctor id is NotFound, never
        // a validation or conflict answer.
        self.directory
            .get_doctor(request.doctor_id, auth_token)
            .await
            .map_err(map_directory_error)?;

        if request.start_time >= request.end_time {
            return Err(AvailabilityError::InvalidTimeRange(format!(
                "Start time {} must be before end time {}",
                request.start_time, request.end_time
            )));
        }

        let duration = request
            .duration_minutes
            .unwrap_or(DEFAULT_SLOT_DURATION_MINUTES);
        validate_duration(duration)?;

        // Serialize writers on (doctor, day) so two concurrent creates cannot
        // both pass the overlap read.
        let lock = SchedulingLock::new(&self.supabase);
        let lock_key = format!("slots_{}_{}", request.doctor_id, request.day_of_week);
        lock.acquire(&lock_key)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let result = self.create_under_lock(&request, duration, auth_token).await;

        if let Err(e) = lock.release(&lock_key).await {
            debug!("Lock release failed for {}: {}", lock_key, e);
        }

        result
    }

    async fn create_under_lock(
        &self,
        request: &CreateTimeSlotRequest,
        duration: i32,
        auth_token: &str,
    ) -> Result<TimeSlot, AvailabilityError> {
        let checker = OverlapChecker::new(&self.supabase);
        if let Some(existing) = checker
            .find_overlap(
                request.doctor_id,
                request.day_of_week,
                request.start_time,
                request.end_time,
                None,
                auth_token,
            )
            .await?
        {
            return Err(AvailabilityError::SlotOverlap {
                day: existing.day_of_week,
                start: existing.start_time,
                end: existing.end_time,
            });
        }

        let slot_data = json!({
            "doctor_id": request.doctor_id,
            "day_of_week": request.day_of_week,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "duration_minutes": duration,
            "is_active": true,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/time_slots",
                Some(auth_token),
                Some(slot_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            AvailabilityError::DatabaseError("Insert returned no representation".to_string())
        })?;

        let slot: TimeSlot = serde_json::from_value(row)
            .map_err(|e| AvailabilityError::DatabaseError(format!("Bad slot row: {}", e)))?;
        debug!("Time slot created with ID: {}", slot.id);

        Ok(slot)
    }

    pub async fn update_time_slot(
        &self,
        slot_id: Uuid,
        request: UpdateTimeSlotRequest,
        auth_token: &str,
    ) -> Result<TimeSlot, AvailabilityError> {
        debug!("Updating time slot: {}", slot_id);

        let current = self.get_time_slot(slot_id, auth_token).await?;

        let day = request.day_of_week.unwrap_or(current.day_of_week);
        let start = request.start_time.unwrap_or(current.start_time);
        let end = request.end_time.unwrap_or(current.end_time);

        if start >= end {
            return Err(AvailabilityError::InvalidTimeRange(format!(
                "Start time {} must be before end time {}",
                start, end
            )));
        }
        if let Some(duration) = request.duration_minutes {
            validate_duration(duration)?;
        }

        // The edited row is excluded from the overlap check so a slot can
        // shrink or shift within its own window.
        let checker = OverlapChecker::new(&self.supabase);
        if let Some(existing) = checker
            .find_overlap(current.doctor_id, day, start, end, Some(slot_id), auth_token)
            .await?
        {
            return Err(AvailabilityError::SlotOverlap {
                day: existing.day_of_week,
                start: existing.start_time,
                end: existing.end_time,
            });
        }

        let mut update_data = Map::new();
        if let Some(day) = request.day_of_week {
            update_data.insert("day_of_week".to_string(), json!(day));
        }
        if let Some(start_time) = request.start_time {
            update_data.insert(
                "start_time".to_string(),
                json!(start_time.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(end_time) = request.end_time {
            update_data.insert(
                "end_time".to_string(),
                json!(end_time.format("%H:%M:%S").to_string()),
            );
        }
        if let Some(duration) = request.duration_minutes {
            update_data.insert("duration_minutes".to_string(), json!(duration));
        }
        if let Some(is_active) = request.is_active {
            update_data.insert("is_active".to_string(), json!(is_active));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/time_slots?id=eq.{}", slot_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update_data)),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or(AvailabilityError::SlotNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| AvailabilityError::DatabaseError(format!("Bad slot row: {}", e)))
    }

    pub async fn delete_time_slot(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AvailabilityError> {
        debug!("Deleting time slot: {}", slot_id);

        // Load first so a missing id is NotFound rather than a silent no-op.
        self.get_time_slot(slot_id, auth_token).await?;

        let path = format!("/rest/v1/time_slots?id=eq.{}", slot_id);
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    pub async fn get_time_slot(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<TimeSlot, AvailabilityError> {
        let path = format!("/rest/v1/time_slots?id=eq.{}", slot_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or(AvailabilityError::SlotNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| AvailabilityError::DatabaseError(format!("Bad slot row: {}", e)))
    }

    pub async fn get_time_slots_for_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<TimeSlot>, AvailabilityError> {
        let path = format!("/rest/v1/time_slots?doctor_id=eq.{}", doctor_id);
        let mut slots = self.fetch_slots(&path, auth_token).await?;
        slots.sort_by_key(|s| (s.day_of_week.weekday_index(), s.start_time));
        Ok(slots)
    }

    pub async fn get_time_slots_for_day(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
        auth_token: &str,
    ) -> Result<Vec<TimeSlot>, AvailabilityError> {
        let path = format!(
            "/rest/v1/time_slots?doctor_id=eq.{}&day_of_week=eq.{}&is_active=eq.true&order=start_time.asc",
            doctor_id, day
        );
        self.fetch_slots(&path, auth_token).await
    }

    /// Candidate booking times for one calendar date, merged across the
    /// doctor's active windows for that weekday. Taken times are NOT removed
    /// here; the appointment cell subtracts them.
    pub async fn bookable_times_for_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<chrono::NaiveTime>, AvailabilityError> {
        use chrono::Datelike;

        self.directory
            .get_doctor(doctor_id, auth_token)
            .await
            .map_err(map_directory_error)?;

        let day = DayOfWeek::from(date.weekday());
        debug!(
            "Computing bookable times for doctor {} on {} ({})",
            doctor_id, date, day
        );

        let day_slots = self.get_time_slots_for_day(doctor_id, day, auth_token).await?;
        Ok(slots::merge_bookable_times(&day_slots))
    }

    async fn fetch_slots(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<TimeSlot>, AvailabilityError> {
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| AvailabilityError::DatabaseError(format!("Bad slot row: {}", e)))
            })
            .collect()
    }
}

fn validate_duration(duration: i32) -> Result<(), AvailabilityError> {
    if !(MIN_SLOT_DURATION_MINUTES..=MAX_SLOT_DURATION_MINUTES).contains(&duration) {
        return Err(AvailabilityError::InvalidDuration(format!(
            "Duration must be between {} and {} minutes, got {}",
            MIN_SLOT_DURATION_MINUTES, MAX_SLOT_DURATION_MINUTES, duration
        )));
    }
    Ok(())
}

fn map_directory_error(e: DirectoryError) -> AvailabilityError {
    match e {
        DirectoryError::DoctorNotFound | DirectoryError::PatientNotFound => {
            AvailabilityError::DoctorNotFound
        }
        DirectoryError::DatabaseError(msg) => AvailabilityError::DatabaseError(msg),
    }
}

fn representation_headers() -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "Prefer",
        reqwest::header::HeaderValue::from_static("return=representation"),
    );
    headers
}
