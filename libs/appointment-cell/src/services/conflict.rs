use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, MAX_APPOINTMENT_DURATION_MINUTES};

/// Half-open interval test over concrete booking times.
pub fn appointments_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Returns the doctor's appointments that overlap `[start, end)` and
    /// still hold their slot. Interval overlap, not exact-timestamp match:
    /// a 09:00 60-minute booking must also block 09:30.
    pub async fn find_conflicts(
        &self,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!(
            "Checking conflicts for doctor {} from {} to {}",
            doctor_id, start_time, end_time
        );

        let existing = self
            .get_doctor_appointments_in_range(
                doctor_id,
                start_time,
                end_time,
                exclude_appointment_id,
                auth_token,
            )
            .await?;

        let conflicting: Vec<Appointment> = existing
            .into_iter()
            .filter(|apt| apt.status.blocks_slot())
            .filter(|apt| {
                appointments_overlap(start_time, end_time, apt.scheduled_at, apt.end_time())
            })
            .collect();

        if !conflicting.is_empty() {
            warn!(
                "Conflict detected for doctor {} - {} overlapping appointments",
                doctor_id,
                conflicting.len()
            );
        }

        Ok(conflicting)
    }

    pub async fn has_conflict(
        &self,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        Ok(!self
            .find_conflicts(doctor_id, start_time, end_time, exclude_appointment_id, auth_token)
            .await?
            .is_empty())
    }

    /// Fetch candidates in a widened window. A row starting before the
    /// requested interval can still reach into it, so the lower bound is
    /// padded by the maximum duration any appointment may carry; the overlap
    /// predicate does the precise cut afterwards.
    async fn get_doctor_appointments_in_range(
        &self,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let window_start = start_time - Duration::minutes(MAX_APPOINTMENT_DURATION_MINUTES as i64);

        let mut path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&scheduled_at=gte.{}&scheduled_at=lt.{}&status=not.in.(cancelled,no_show)&order=scheduled_at.asc",
            doctor_id,
            urlencoding::encode(&window_start.to_rfc3339()),
            urlencoding::encode(&end_time.to_rfc3339()),
        );
        if let Some(id) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", id));
        }

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    #[test]
    fn same_interval_conflicts() {
        assert!(appointments_overlap(at(9, 0), at(9, 30), at(9, 0), at(9, 30)));
    }

    #[test]
    fn long_booking_blocks_interior_start() {
        // 09:00 for 60 minutes must block a 09:30 request
        assert!(appointments_overlap(at(9, 30), at(10, 0), at(9, 0), at(10, 0)));
    }

    #[test]
    fn back_to_back_does_not_conflict() {
        assert!(!appointments_overlap(at(9, 30), at(10, 0), at(9, 0), at(9, 30)));
    }

    #[test]
    fn disjoint_does_not_conflict() {
        assert!(!appointments_overlap(at(9, 0), at(9, 30), at(14, 0), at(14, 30)));
    }
}
