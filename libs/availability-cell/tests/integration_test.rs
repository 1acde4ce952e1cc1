use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use availability_cell::router::time_slot_routes;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn test_app(mock_server: &MockServer) -> Router {
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    time_slot_routes(Arc::new(config))
}

async fn mount_doctor(mock_server: &MockServer, doctor_id: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_row(doctor_id, "Alice", "Nguyen", "Cardiology")
        ])))
        .mount(mock_server)
        .await;
}

async fn mount_lock_cycle(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "lock_key": "x" }])))
        .mount(mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(204))
        .mount(mock_server)
        .await;
}

fn create_request(doctor_id: &str, start: &str, end: &str) -> Request<Body> {
    let body = json!({
        "doctor_id": doctor_id,
        "day_of_week": "monday",
        "start_time": start,
        "end_time": end
    });

    Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", "Bearer test-token")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_create_time_slot_success() {
    let mock_server = MockServer::start().await;
    let doctor_id = MockSupabaseResponses::new_uuid();
    let slot_id = MockSupabaseResponses::new_uuid();

    mount_doctor(&mock_server, &doctor_id).await;
    mount_lock_cycle(&mock_server).await;

    // no existing windows on this day
    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::time_slot_row(&slot_id, &doctor_id, "monday", "09:00:00", "12:00:00")
        ])))
        .mount(&mock_server)
        .await;

    let app = test_app(&mock_server);
    let response = app
        .oneshot(create_request(&doctor_id, "09:00:00", "12:00:00"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let slot: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(slot["day_of_week"], "monday");
    assert_eq!(slot["start_time"], "09:00:00");
}

#[tokio::test]
async fn test_create_overlapping_slot_rejected_and_not_persisted() {
    let mock_server = MockServer::start().await;
    let doctor_id = MockSupabaseResponses::new_uuid();
    let existing_id = MockSupabaseResponses::new_uuid();

    mount_doctor(&mock_server, &doctor_id).await;
    mount_lock_cycle(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::time_slot_row(&existing_id, &doctor_id, "monday", "09:00:00", "12:00:00")
        ])))
        .mount(&mock_server)
        .await;

    // the insert must never run when the window overlaps
    Mock::given(method("POST"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let app = test_app(&mock_server);
    let response = app
        .oneshot(create_request(&doctor_id, "10:00:00", "13:00:00"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_touching_slot_allowed() {
    let mock_server = MockServer::start().await;
    let doctor_id = MockSupabaseResponses::new_uuid();
    let existing_id = MockSupabaseResponses::new_uuid();
    let new_id = MockSupabaseResponses::new_uuid();

    mount_doctor(&mock_server, &doctor_id).await;
    mount_lock_cycle(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::time_slot_row(&existing_id, &doctor_id, "monday", "09:00:00", "12:00:00")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::time_slot_row(&new_id, &doctor_id, "monday", "12:00:00", "14:00:00")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = test_app(&mock_server);
    let response = app
        .oneshot(create_request(&doctor_id, "12:00:00", "14:00:00"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_slot_start_after_end_rejected() {
    let mock_server = MockServer::start().await;
    let doctor_id = MockSupabaseResponses::new_uuid();

    mount_doctor(&mock_server, &doctor_id).await;

    let app = test_app(&mock_server);
    let response = app
        .oneshot(create_request(&doctor_id, "14:00:00", "09:00:00"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_slot_unknown_doctor_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let app = test_app(&mock_server);
    // invalid time range too, but the missing doctor must win
    let response = app
        .oneshot(create_request(
            &MockSupabaseResponses::new_uuid(),
            "14:00:00",
            "09:00:00",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_slot_excludes_itself_from_overlap_check() {
    let mock_server = MockServer::start().await;
    let doctor_id = MockSupabaseResponses::new_uuid();
    let slot_id = MockSupabaseResponses::new_uuid();

    // load by id, then the overlap read filtered by id=neq returns nothing
    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .and(wiremock::matchers::query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::time_slot_row(&slot_id, &doctor_id, "monday", "09:00:00", "12:00:00")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .and(wiremock::matchers::query_param("id", format!("neq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::time_slot_row(&slot_id, &doctor_id, "monday", "09:00:00", "13:00:00")
        ])))
        .mount(&mock_server)
        .await;

    let body = json!({ "end_time": "13:00:00" });
    let request = Request::builder()
        .method("PUT")
        .uri(&format!("/{}", slot_id))
        .header("authorization", "Bearer test-token")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let app = test_app(&mock_server);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let slot: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(slot["end_time"], "13:00:00");
}

#[tokio::test]
async fn test_bookable_times_for_date() {
    let mock_server = MockServer::start().await;
    let doctor_id = MockSupabaseResponses::new_uuid();
    let slot_id = MockSupabaseResponses::new_uuid();

    mount_doctor(&mock_server, &doctor_id).await;

    // 2025-06-02 is a Monday
    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::time_slot_row(&slot_id, &doctor_id, "monday", "09:00:00", "10:30:00")
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri(&format!("/doctors/{}/available?date=2025-06-02", doctor_id))
        .header("authorization", "Bearer test-token")
        .body(Body::empty())
        .unwrap();

    let app = test_app(&mock_server);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json_response: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json_response["times"], json!(["09:00:00", "09:30:00", "10:00:00"]));
}

#[tokio::test]
async fn test_bookable_times_unknown_doctor_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri(&format!(
            "/doctors/{}/available?date=2025-06-02",
            MockSupabaseResponses::new_uuid()
        ))
        .header("authorization", "Bearer test-token")
        .body(Body::empty())
        .unwrap();

    let app = test_app(&mock_server);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_doctor_listing_is_in_calendar_order() {
    let mock_server = MockServer::start().await;
    let doctor_id = MockSupabaseResponses::new_uuid();

    // stored rows come back friday-first; the listing must not keep the
    // alphabetical order of the text enum
    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::time_slot_row(
                &MockSupabaseResponses::new_uuid(),
                &doctor_id,
                "friday",
                "09:00:00",
                "12:00:00"
            ),
            MockSupabaseResponses::time_slot_row(
                &MockSupabaseResponses::new_uuid(),
                &doctor_id,
                "monday",
                "14:00:00",
                "16:00:00"
            ),
            MockSupabaseResponses::time_slot_row(
                &MockSupabaseResponses::new_uuid(),
                &doctor_id,
                "monday",
                "09:00:00",
                "12:00:00"
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri(&format!("/doctors/{}", doctor_id))
        .header("authorization", "Bearer test-token")
        .body(Body::empty())
        .unwrap();

    let app = test_app(&mock_server);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json_response: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let slots = json_response["time_slots"].as_array().unwrap();
    assert_eq!(slots[0]["day_of_week"], "monday");
    assert_eq!(slots[0]["start_time"], "09:00:00");
    assert_eq!(slots[1]["day_of_week"], "monday");
    assert_eq!(slots[1]["start_time"], "14:00:00");
    assert_eq!(slots[2]["day_of_week"], "friday");
}

#[tokio::test]
async fn test_get_time_slot_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri(&format!("/{}", MockSupabaseResponses::new_uuid()))
        .header("authorization", "Bearer test-token")
        .body(Body::empty())
        .unwrap();

    let app = test_app(&mock_server);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
