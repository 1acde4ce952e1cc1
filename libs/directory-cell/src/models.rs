use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flat snapshot of a doctor row. The scheduling cells only ever need the
/// identity and display data, never a live entity graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub specialty: Option<String>,
}

impl DoctorProfile {
    pub fn full_name(&self) -> String {
        format!("Dr. {} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

impl PatientProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
