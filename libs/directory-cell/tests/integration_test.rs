use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use assert_matches::assert_matches;
use directory_cell::models::DirectoryError;
use directory_cell::services::directory::DirectoryService;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn service_for(mock_server: &MockServer) -> DirectoryService {
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    DirectoryService::new(&config)
}

#[tokio::test]
async fn test_get_doctor_found() {
    let mock_server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::doctor_row(
                &doctor_id.to_string(),
                "Alice",
                "Nguyen",
                "Cardiology",
            ),
        ]))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let doctor = service.get_doctor(doctor_id, "test-token").await.unwrap();

    assert_eq!(doctor.id, doctor_id);
    assert_eq!(doctor.full_name(), "Dr. Alice Nguyen");
    assert_eq!(doctor.specialty.as_deref(), Some("Cardiology"));
}

#[tokio::test]
async fn test_get_doctor_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let result = service.get_doctor(Uuid::new_v4(), "test-token").await;

    assert_matches!(result, Err(DirectoryError::DoctorNotFound));
}

#[tokio::test]
async fn test_get_patient_found() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            MockSupabaseResponses::patient_row(
                &patient_id.to_string(),
                "Ben",
                "Okafor",
                "ben@example.com",
            ),
        ]))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let patient = service.get_patient(patient_id, "test-token").await.unwrap();

    assert_eq!(patient.id, patient_id);
    assert_eq!(patient.full_name(), "Ben Okafor");
}

#[tokio::test]
async fn test_get_patient_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let result = service.get_patient(Uuid::new_v4(), "test-token").await;

    assert_matches!(result, Err(DirectoryError::PatientNotFound));
}

#[tokio::test]
async fn test_get_doctor_database_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(500).set_body_string("connection reset"))
        .mount(&mock_server)
        .await;

    let service = service_for(&mock_server);
    let result = service.get_doctor(Uuid::new_v4(), "test-token").await;

    assert_matches!(result, Err(DirectoryError::DatabaseError(_)));
}
