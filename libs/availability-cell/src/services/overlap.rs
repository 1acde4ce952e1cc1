use chrono::NaiveTime;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{AvailabilityError, DayOfWeek, TimeSlot};

/// Half-open interval test. `[a_start, a_end)` against `[b_start, b_end)`;
/// windows that merely touch do not overlap.
pub fn intervals_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Query-layer companion to [`intervals_overlap`]: loads the active windows
/// for a (doctor, day) pair and applies the predicate against each.
pub struct OverlapChecker<'a> {
    supabase: &'a SupabaseClient,
}

impl<'a> OverlapChecker<'a> {
    pub fn new(supabase: &'a SupabaseClient) -> Self {
        Self { supabase }
    }

    /// Returns the first conflicting slot, if any. `exclude_slot_id` lets an
    /// update skip the row being edited.
    pub async fn find_overlap(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
        start: NaiveTime,
        end: NaiveTime,
        exclude_slot_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Option<TimeSlot>, AvailabilityError> {
        let mut path = format!(
            "/rest/v1/time_slots?doctor_id=eq.{}&day_of_week=eq.{}&is_active=eq.true",
            doctor_id, day
        );
        if let Some(id) = exclude_slot_id {
            path.push_str(&format!("&id=neq.{}", id));
        }

        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        for row in existing {
            let slot: TimeSlot = serde_json::from_value(row)
                .map_err(|e| AvailabilityError::DatabaseError(format!("Bad slot row: {}", e)))?;

            if intervals_overlap(start, end, slot.start_time, slot.end_time) {
                debug!(
                    "Window {}-{} overlaps slot {} ({}-{})",
                    start, end, slot.id, slot.start_time, slot.end_time
                );
                return Ok(Some(slot));
            }
        }

        Ok(None)
    }

    pub async fn has_overlap(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
        start: NaiveTime,
        end: NaiveTime,
        exclude_slot_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<bool, AvailabilityError> {
        Ok(self
            .find_overlap(doctor_id, day, start, end, exclude_slot_id, auth_token)
            .await?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn overlapping_windows_detected() {
        assert!(intervals_overlap(t(9, 0), t(12, 0), t(10, 0), t(13, 0)));
        assert!(intervals_overlap(t(10, 0), t(13, 0), t(9, 0), t(12, 0)));
    }

    #[test]
    fn contained_window_overlaps() {
        assert!(intervals_overlap(t(9, 0), t(17, 0), t(10, 0), t(11, 0)));
        assert!(intervals_overlap(t(10, 0), t(11, 0), t(9, 0), t(17, 0)));
    }

    #[test]
    fn identical_windows_overlap() {
        assert!(intervals_overlap(t(9, 0), t(12, 0), t(9, 0), t(12, 0)));
    }

    #[test]
    fn touching_windows_do_not_overlap() {
        // 09:00-12:00 followed by 12:00-14:00 is a valid back-to-back pair
        assert!(!intervals_overlap(t(9, 0), t(12, 0), t(12, 0), t(14, 0)));
        assert!(!intervals_overlap(t(12, 0), t(14, 0), t(9, 0), t(12, 0)));
    }

    #[test]
    fn disjoint_windows_do_not_overlap() {
        assert!(!intervals_overlap(t(8, 0), t(9, 0), t(14, 0), t(16, 0)));
    }
}
