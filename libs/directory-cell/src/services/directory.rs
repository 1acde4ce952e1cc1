use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{DirectoryError, DoctorProfile, PatientProfile};

/// Read-only lookups against the doctor/patient tables. Used by the
/// availability and appointment cells to resolve ids into display snapshots
/// before any business-rule check runs.
pub struct DirectoryService {
    supabase: SupabaseClient,
}

impl DirectoryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<DoctorProfile, DirectoryError> {
        debug!("Resolving doctor: {}", doctor_id);

        let path = format!(
            "/rest/v1/doctors?id=eq.{}&select=id,first_name,last_name,specialty",
            doctor_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DirectoryError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(DirectoryError::DoctorNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| DirectoryError::DatabaseError(format!("Failed to parse doctor: {}", e)))
    }

    pub async fn get_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<PatientProfile, DirectoryError> {
        debug!("Resolving patient: {}", patient_id);

        let path = format!(
            "/rest/v1/patients?id=eq.{}&select=id,first_name,last_name,email",
            patient_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DirectoryError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(DirectoryError::PatientNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| DirectoryError::DatabaseError(format!("Failed to parse patient: {}", e)))
    }
}
