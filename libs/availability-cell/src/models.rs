use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Grid step for bookable start times. Slot rows keep their own
/// `duration_minutes` for display, but the booking grid always advances by
/// this fixed interval.
pub const BOOKING_INTERVAL_MINUTES: i64 = 30;

pub const MIN_SLOT_DURATION_MINUTES: i32 = 15;
pub const MAX_SLOT_DURATION_MINUTES: i32 = 120;
pub const DEFAULT_SLOT_DURATION_MINUTES: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    /// Calendar position, Monday first. The wire form is text, so sorting
    /// must go through this rather than the stored string.
    pub fn weekday_index(&self) -> u8 {
        match self {
            DayOfWeek::Monday => 0,
            DayOfWeek::Tuesday => 1,
            DayOfWeek::Wednesday => 2,
            DayOfWeek::Thursday => 3,
            DayOfWeek::Friday => 4,
            DayOfWeek::Saturday => 5,
            DayOfWeek::Sunday => 6,
        }
    }

    /// Wire form used in PostgREST query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Monday => "monday",
            DayOfWeek::Tuesday => "tuesday",
            DayOfWeek::Wednesday => "wednesday",
            DayOfWeek::Thursday => "thursday",
            DayOfWeek::Friday => "friday",
            DayOfWeek::Saturday => "saturday",
            DayOfWeek::Sunday => "sunday",
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl std::fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recurring weekly availability window for one doctor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTimeSlotRequest {
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTimeSlotRequest {
    pub day_of_week: Option<DayOfWeek>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub duration_minutes: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookableTimesResponse {
    pub doctor_id: Uuid,
    pub date: chrono::NaiveDate,
    pub times: Vec<NaiveTime>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Time slot not found")]
    SlotNotFound,

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Slot overlaps an existing window on {day} ({start}-{end})")]
    SlotOverlap {
        day: DayOfWeek,
        start: NaiveTime,
        end: NaiveTime,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),
}
