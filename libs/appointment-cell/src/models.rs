use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_APPOINTMENT_DURATION_MINUTES: i32 = 30;

/// Upper bound on a single appointment. The conflict fetch window relies on
/// this cap: no row starting earlier than this many minutes before a
/// requested interval can reach into it.
pub const MAX_APPOINTMENT_DURATION_MINUTES: i32 = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    NoShow,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
            AppointmentStatus::Completed => "completed",
        }
    }

    /// Terminal appointments never change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::NoShow | AppointmentStatus::Completed
        )
    }

    /// Active appointments hold their interval against new bookings.
    /// Cancelled and no-show rows free it.
    pub fn blocks_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::NoShow)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Patient,
    Doctor,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub cancelled_by: Option<CancelledBy>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.scheduled_at + chrono::Duration::minutes(self.duration_minutes as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Confirmation,
    Reminder,
    Cancellation,
}

/// Outbox row for a patient-facing message. Delivery is a separate worker's
/// concern; this cell only writes the rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub send_after: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelAppointmentRequest {
    pub cancelled_by: CancelledBy,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveAppointmentRequest {
    pub new_doctor_id: Uuid,
    pub new_scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityCheckQuery {
    pub doctor_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookableTimesForDate {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub times: Vec<chrono::NaiveTime>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Dr. {doctor_name} already has an appointment at {scheduled_at}")]
    SlotTaken {
        doctor_name: String,
        scheduled_at: DateTime<Utc>,
    },

    #[error("Invalid time: {0}")]
    InvalidTime(String),

    #[error("Appointment in status {0} cannot change state")]
    TerminalState(AppointmentStatus),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
