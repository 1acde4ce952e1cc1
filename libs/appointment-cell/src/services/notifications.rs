use chrono::Duration;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, NotificationKind};

pub const REMINDER_LEAD_HOURS: i64 = 24;

/// Writes notification outbox rows tied to appointment events. A separate
/// delivery worker drains the table; nothing here sends anything.
pub struct NotificationService {
    supabase: Arc<SupabaseClient>,
}

impl NotificationService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Confirmation (immediate) plus a reminder held until 24h before the
    /// visit. Called while the booking lock is still held so a failure can
    /// roll the insert back.
    pub async fn appointment_booked(
        &self,
        appointment: &Appointment,
        doctor_name: &str,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let when = appointment.scheduled_at.format("%Y-%m-%d %H:%M UTC");

        self.insert_row(
            appointment,
            NotificationKind::Confirmation,
            &format!("Your appointment with {} on {} is confirmed", doctor_name, when),
            None,
            auth_token,
        )
        .await?;

        let send_after = appointment.scheduled_at - Duration::hours(REMINDER_LEAD_HOURS);
        self.insert_row(
            appointment,
            NotificationKind::Reminder,
            &format!("Reminder: appointment with {} on {}", doctor_name, when),
            Some(send_after.to_rfc3339()),
            auth_token,
        )
        .await
    }

    pub async fn appointment_modified(
        &self,
        appointment: &Appointment,
        doctor_name: &str,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let when = appointment.scheduled_at.format("%Y-%m-%d %H:%M UTC");
        self.insert_row(
            appointment,
            NotificationKind::Confirmation,
            &format!("Your appointment with {} was moved to {}", doctor_name, when),
            None,
            auth_token,
        )
        .await
    }

    pub async fn appointment_cancelled(
        &self,
        appointment: &Appointment,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let when = appointment.scheduled_at.format("%Y-%m-%d %H:%M UTC");
        self.insert_row(
            appointment,
            NotificationKind::Cancellation,
            &format!("Your appointment on {} was cancelled", when),
            None,
            auth_token,
        )
        .await
    }

    async fn insert_row(
        &self,
        appointment: &Appointment,
        kind: NotificationKind,
        message: &str,
        send_after: Option<String>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        debug!(
            "Writing {:?} notification for appointment {}",
            kind, appointment.id
        );

        let row = json!({
            "appointment_id": appointment.id,
            "recipient_id": appointment.patient_id,
            "kind": kind,
            "message": message,
            "send_after": send_after,
            "sent_at": null,
            "created_at": chrono::Utc::now().to_rfc3339()
        });

        let _: Value = self
            .supabase
            .request(Method::POST, "/rest/v1/notifications", Some(auth_token), Some(row))
            .await
            .map_err(|e| AppointmentError::DatabaseError(format!("Notification write failed: {}", e)))?;

        Ok(())
    }
}
