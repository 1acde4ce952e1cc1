use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub jwt_secret: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// Canned PostgREST rows used by the wiremock-backed service tests.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_row(id: &str, first_name: &str, last_name: &str, specialty: &str) -> Value {
        json!({
            "id": id,
            "first_name": first_name,
            "last_name": last_name,
            "specialty": specialty
        })
    }

    pub fn patient_row(id: &str, first_name: &str, last_name: &str, email: &str) -> Value {
        json!({
            "id": id,
            "first_name": first_name,
            "last_name": last_name,
            "email": email
        })
    }

    pub fn time_slot_row(
        id: &str,
        doctor_id: &str,
        day_of_week: &str,
        start_time: &str,
        end_time: &str,
    ) -> Value {
        json!({
            "id": id,
            "doctor_id": doctor_id,
            "day_of_week": day_of_week,
            "start_time": start_time,
            "end_time": end_time,
            "duration_minutes": 30,
            "is_active": true,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn appointment_row(
        id: &str,
        patient_id: &str,
        doctor_id: &str,
        scheduled_at: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "scheduled_at": scheduled_at,
            "duration_minutes": 30,
            "reason": null,
            "status": status,
            "cancelled_by": null,
            "cancellation_reason": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn new_uuid() -> String {
        Uuid::new_v4().to_string()
    }
}
