use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::models::AvailabilityError;
use availability_cell::services::availability::AvailabilityService;
use directory_cell::models::DirectoryError;
use directory_cell::services::directory::DirectoryService;
use shared_config::AppConfig;
use shared_database::lock::SchedulingLock;
use shared_database::supabase::SupabaseClient;
use shared_utils::clock::{Clock, SystemClock};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CancelAppointmentRequest,
    CreateAppointmentRequest, MoveAppointmentRequest, UpdateAppointmentRequest,
    DEFAULT_APPOINTMENT_DURATION_MINUTES, MAX_APPOINTMENT_DURATION_MINUTES,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notifications::NotificationService;

/// Books and manages concrete appointments against the doctors' recurring
/// windows. All writes to a doctor's calendar run under the per-doctor
/// scheduling lock.
pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    directory: DirectoryService,
    availability: AvailabilityService,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    notification_service: NotificationService,
    clock: Arc<dyn Clock>,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            directory: DirectoryService::new(config),
            availability: AvailabilityService::new(config),
            conflict_service: ConflictDetectionService::new(supabase.clone()),
            lifecycle_service: AppointmentLifecycleService::new(),
            notification_service: NotificationService::new(supabase.clone()),
            supabase,
            clock,
        }
    }

    /// True iff no active appointment of the doctor overlaps the given
    /// interval.
    pub async fn is_slot_available(
        &self,
        doctor_id: Uuid,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i32,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let end = scheduled_at + Duration::minutes(duration_minutes as i64);
        Ok(!self
            .conflict_service
            .has_conflict(doctor_id, scheduled_at, end, None, auth_token)
            .await?)
    }

    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!(
            "Booking appointment for patient {} with doctor {} at {}",
            request.patient_id, request.doctor_id, request.scheduled_at
        );

        // Existence first: a bad id answers NotFound, never Conflict.
        self.directory
            .get_patient(request.patient_id, auth_token)
            .await
            .map_err(map_directory_error)?;
        let doctor = self
            .directory
            .get_doctor(request.doctor_id, auth_token)
            .await
            .map_err(map_directory_error)?;

        let duration = request
            .duration_minutes
            .unwrap_or(DEFAULT_APPOINTMENT_DURATION_MINUTES);
        if !(1..=MAX_APPOINTMENT_DURATION_MINUTES).contains(&duration) {
            return Err(AppointmentError::ValidationError(format!(
                "Duration must be between 1 and {} minutes, got {}",
                MAX_APPOINTMENT_DURATION_MINUTES, duration
            )));
        }
        if request.scheduled_at <= self.clock.now() {
            return Err(AppointmentError::InvalidTime(format!(
                "Appointment time {} is in the past",
                request.scheduled_at
            )));
        }

        let lock = SchedulingLock::new(&self.supabase);
        let lock_key = format!("doctor_{}", request.doctor_id);
        lock.acquire(&lock_key)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let result = self
            .create_under_lock(&request, duration, &doctor.full_name(), auth_token)
            .await;

        if let Err(e) = lock.release(&lock_key).await {
            warn!("Lock release failed for {}: {}", lock_key, e);
        }

        result
    }

    async fn create_under_lock(
        &self,
        request: &CreateAppointmentRequest,
        duration: i32,
        doctor_name: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let end = request.scheduled_at + Duration::minutes(duration as i64);
        let conflicts = self
            .conflict_service
            .find_conflicts(request.doctor_id, request.scheduled_at, end, None, auth_token)
            .await?;

        if !conflicts.is_empty() {
            return Err(AppointmentError::SlotTaken {
                doctor_name: doctor_name.to_string(),
                scheduled_at: request.scheduled_at,
            });
        }

        let appointment_data = json!({
            "patient_id": request.patient_id,
            "doctor_id": request.doctor_id,
            "scheduled_at": request.scheduled_at.to_rfc3339(),
            "duration_minutes": duration,
            "reason": request.reason,
            "status": AppointmentStatus::Pending,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            AppointmentError::DatabaseError("Insert returned no representation".to_string())
        })?;
        let appointment: Appointment = serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Bad appointment row: {}", e)))?;

        // Notification rows are part of the booking: if they cannot be
        // written the insert is compensated so no half-booked state escapes.
        if let Err(e) = self
            .notification_service
            .appointment_booked(&appointment, doctor_name, auth_token)
            .await
        {
            warn!(
                "Notification write failed for appointment {}, rolling back: {}",
                appointment.id, e
            );
            self.delete_appointment_row(appointment.id, auth_token).await?;
            return Err(e);
        }

        info!("Appointment {} booked with {}", appointment.id, doctor_name);
        Ok(appointment)
    }

    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        let mut update_data = Map::new();
        let mut time_changed = false;

        if let Some(new_time) = request.scheduled_at {
            if new_time != current.scheduled_at {
                if new_time <= self.clock.now() {
                    return Err(AppointmentError::InvalidTime(format!(
                        "Appointment time {} is in the past",
                        new_time
                    )));
                }

                let end = new_time + Duration::minutes(current.duration_minutes as i64);
                let conflicts = self
                    .conflict_service
                    .find_conflicts(current.doctor_id, new_time, end, Some(appointment_id), auth_token)
                    .await?;
                if !conflicts.is_empty() {
                    let doctor = self
                        .directory
                        .get_doctor(current.doctor_id, auth_token)
                        .await
                        .map_err(map_directory_error)?;
                    return Err(AppointmentError::SlotTaken {
                        doctor_name: doctor.full_name(),
                        scheduled_at: new_time,
                    });
                }

                update_data.insert("scheduled_at".to_string(), json!(new_time.to_rfc3339()));
                time_changed = true;
            }
        }

        if let Some(reason) = request.reason {
            update_data.insert("reason".to_string(), json!(reason));
        }

        if update_data.is_empty() {
            return Ok(current);
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let updated = self
            .patch_appointment(appointment_id, Value::Object(update_data), auth_token)
            .await?;

        if time_changed {
            let notify = async {
                let doctor = self
                    .directory
                    .get_doctor(updated.doctor_id, auth_token)
                    .await
                    .map_err(map_directory_error)?;
                self.notification_service
                    .appointment_modified(&updated, &doctor.full_name(), auth_token)
                    .await
            };

            if let Err(e) = notify.await {
                warn!(
                    "Notification write failed for appointment {}, reverting update: {}",
                    appointment_id, e
                );
                let mut revert = Map::new();
                revert.insert(
                    "scheduled_at".to_string(),
                    json!(current.scheduled_at.to_rfc3339()),
                );
                revert.insert("reason".to_string(), json!(current.reason));
                revert.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
                self.patch_appointment(appointment_id, Value::Object(revert), auth_token)
                    .await?;
                return Err(e);
            }
        }

        Ok(updated)
    }

    /// Cancel releases the interval for rebooking. Idempotent it is not:
    /// cancelling a terminal appointment is a caller error.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        if current.status.is_terminal() {
            return Err(AppointmentError::TerminalState(current.status));
        }
        self.lifecycle_service
            .validate_status_transition(&current.status, &AppointmentStatus::Cancelled)?;

        let mut update_data = Map::new();
        update_data.insert("status".to_string(), json!(AppointmentStatus::Cancelled));
        update_data.insert("cancelled_by".to_string(), json!(request.cancelled_by));
        update_data.insert("cancellation_reason".to_string(), json!(request.reason));
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let cancelled = self
            .patch_appointment(appointment_id, Value::Object(update_data), auth_token)
            .await?;

        // The cancellation notification is part of the operation: if its row
        // cannot be written the status change is reverted.
        if let Err(e) = self
            .notification_service
            .appointment_cancelled(&cancelled, auth_token)
            .await
        {
            warn!(
                "Notification write failed for appointment {}, reverting cancel: {}",
                appointment_id, e
            );
            let mut revert = Map::new();
            revert.insert("status".to_string(), json!(current.status));
            revert.insert("cancelled_by".to_string(), json!(current.cancelled_by));
            revert.insert(
                "cancellation_reason".to_string(),
                json!(current.cancellation_reason),
            );
            revert.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
            self.patch_appointment(appointment_id, Value::Object(revert), auth_token)
                .await?;
            return Err(e);
        }

        info!("Appointment {} cancelled", appointment_id);
        Ok(cancelled)
    }

    pub async fn move_appointment(
        &self,
        appointment_id: Uuid,
        request: MoveAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!(
            "Moving appointment {} to doctor {} at {}",
            appointment_id, request.new_doctor_id, request.new_scheduled_at
        );

        let current = self.get_appointment(appointment_id, auth_token).await?;
        let doctor = self
            .directory
            .get_doctor(request.new_doctor_id, auth_token)
            .await
            .map_err(map_directory_error)?;

        if request.new_scheduled_at <= self.clock.now() {
            return Err(AppointmentError::InvalidTime(format!(
                "Appointment time {} is in the past",
                request.new_scheduled_at
            )));
        }

        let end = request.new_scheduled_at + Duration::minutes(current.duration_minutes as i64);
        let conflicts = self
            .conflict_service
            .find_conflicts(
                request.new_doctor_id,
                request.new_scheduled_at,
                end,
                Some(appointment_id),
                auth_token,
            )
            .await?;
        if !conflicts.is_empty() {
            return Err(AppointmentError::SlotTaken {
                doctor_name: doctor.full_name(),
                scheduled_at: request.new_scheduled_at,
            });
        }

        let mut update_data = Map::new();
        update_data.insert("doctor_id".to_string(), json!(request.new_doctor_id));
        update_data.insert(
            "scheduled_at".to_string(),
            json!(request.new_scheduled_at.to_rfc3339()),
        );
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let moved = self
            .patch_appointment(appointment_id, Value::Object(update_data), auth_token)
            .await?;

        if let Err(e) = self
            .notification_service
            .appointment_modified(&moved, &doctor.full_name(), auth_token)
            .await
        {
            warn!(
                "Notification write failed for appointment {}, reverting move: {}",
                appointment_id, e
            );
            let mut revert = Map::new();
            revert.insert("doctor_id".to_string(), json!(current.doctor_id));
            revert.insert(
                "scheduled_at".to_string(),
                json!(current.scheduled_at.to_rfc3339()),
            );
            revert.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
            self.patch_appointment(appointment_id, Value::Object(revert), auth_token)
                .await?;
            return Err(e);
        }

        Ok(moved)
    }

    /// Bookable times for a date: the availability grid minus the
    /// times-of-day already held by active appointments on that day.
    pub async fn bookable_times_for_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<chrono::NaiveTime>, AppointmentError> {
        let candidates = self
            .availability
            .bookable_times_for_date(doctor_id, date, auth_token)
            .await
            .map_err(|e| match e {
                AvailabilityError::DoctorNotFound => AppointmentError::DoctorNotFound,
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        let appointments = self
            .appointments_for_doctor_on_date(doctor_id, date, auth_token)
            .await?;

        let taken: Vec<chrono::NaiveTime> = appointments
            .iter()
            .filter(|apt| apt.status.blocks_slot())
            .map(|apt| apt.scheduled_at.time())
            .collect();

        Ok(candidates
            .into_iter()
            .filter(|t| !taken.contains(t))
            .collect())
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Bad appointment row: {}", e)))
    }

    pub async fn appointments_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&order=scheduled_at.asc",
            patient_id
        );
        self.fetch_appointments(&path, auth_token).await
    }

    pub async fn appointments_for_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&order=scheduled_at.asc",
            doctor_id
        );
        self.fetch_appointments(&path, auth_token).await
    }

    pub async fn appointments_for_doctor_on_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let start_of_day = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let end_of_day = start_of_day + Duration::days(1);

        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&scheduled_at=gte.{}&scheduled_at=lt.{}&order=scheduled_at.asc",
            doctor_id,
            urlencoding::encode(&start_of_day.to_rfc3339()),
            urlencoding::encode(&end_of_day.to_rfc3339()),
        );
        self.fetch_appointments(&path, auth_token).await
    }

    /// Dashboard count per status.
    pub async fn count_by_status(
        &self,
        status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<usize, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?status=eq.{}&select=id",
            status.as_str()
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(result.len())
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        update_data: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Bad appointment row: {}", e)))
    }

    async fn delete_appointment_row(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let _: Value = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(format!("Rollback failed: {}", e)))?;
        Ok(())
    }

    async fn fetch_appointments(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AppointmentError::DatabaseError(format!("Bad appointment row: {}", e))
                })
            })
            .collect()
    }
}

fn map_directory_error(e: DirectoryError) -> AppointmentError {
    match e {
        DirectoryError::DoctorNotFound => AppointmentError::DoctorNotFound,
        DirectoryError::PatientNotFound => AppointmentError::PatientNotFound,
        DirectoryError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
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
