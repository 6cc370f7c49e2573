mod common;

use axum::http::StatusCode;
use common::*;
use parcel_core::job::JobStatus;
use parcel_core::types::JobId;
use parcel_db::JobStore;
use serde_json::json;

fn event_body(subject: &str) -> serde_json::Value {
    json!({
        "teamId": TEAM,
        "resourceId": "dr_1",
        "channel": "dataroom",
        "actor": "viewer@example.com",
        "eventType": "document.added",
        "subjectId": subject,
        "payload": {"documentId": subject},
    })
}

async fn completed_job(app: &TestApp) -> JobId {
    let token = token_for(&user("u1"));
    let response = post_json(
        app,
        "/api/v1/jobs",
        Some(&token),
        json!({"resourceId": "dr_1", "sourceObjects": ["a.pdf"]}),
    )
    .await;
    let json = body_json(response).await;
    let id: JobId = json["data"]["jobId"].as_str().unwrap().parse().unwrap();
    wait_for_terminal(&app.store, id).await;
    id
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_routes_require_the_service_secret() {
    let app = build_test_app();
    let id = completed_job(&app).await;
    let uri = format!("/api/v1/internal/jobs/{id}");

    let response = get(&app, &uri, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get(&app, &uri, Some("not-the-secret")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A valid user token is not a service credential.
    let response = get(&app, &uri, Some(&token_for(&user("u1")))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_get_returns_full_record() {
    let app = build_test_app();
    let id = completed_job(&app).await;

    let response = get(&app, &format!("/api/v1/internal/jobs/{id}"), Some(INTERNAL_SECRET)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "COMPLETED");
    assert_eq!(json["data"]["accessUrls"][0], ARTIFACT_URL);
    assert_eq!(json["data"]["objectRefs"][0]["bucket"], "bucket1");
    assert_eq!(json["data"]["actor"]["userId"], "u1");
}

#[tokio::test]
async fn dispatching_a_finished_job_conflicts() {
    let app = build_test_app();
    let id = completed_job(&app).await;

    let response = post_json(
        &app,
        &format!("/api/v1/internal/jobs/{id}/dispatch"),
        Some(INTERNAL_SECRET),
        json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(app.backend.call_count(), 1);
}

#[tokio::test]
async fn dispatching_unknown_job_is_not_found() {
    let app = build_test_app();

    let response = post_json(
        &app,
        &format!("/api/v1/internal/jobs/{}/dispatch", uuid::Uuid::now_v7()),
        Some(INTERNAL_SECRET),
        json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dispatching_a_pending_job_runs_it() {
    let app = build_test_app();
    let id = completed_job(&app).await;
    let mut job = app.store.get(id).await.unwrap().unwrap();
    job.status = JobStatus::Pending;
    job.object_refs.clear();
    job.access_urls.clear();
    job.completed_at = None;
    job.expires_at = None;
    app.store.insert_raw(job).await;

    let response = post_json(
        &app,
        &format!("/api/v1/internal/jobs/{id}/dispatch"),
        Some(INTERNAL_SECRET),
        json!({}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["data"]["dispatched"], true);

    let job = wait_for_terminal(&app.store, id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(app.backend.call_count(), 2);
}

// ---------------------------------------------------------------------------
// Notification events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recording_events_schedules_then_collapses() {
    let app = build_test_app();

    let response = post_json(
        &app,
        "/api/v1/internal/notifications/events",
        Some(INTERNAL_SECRET),
        event_body("doc_1"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["trigger"], "scheduled");
    assert!(json["data"]["eventId"].is_string());

    let response = post_json(
        &app,
        "/api/v1/internal/notifications/events",
        Some(INTERNAL_SECRET),
        event_body("doc_1"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["data"]["trigger"], "collapsed");

    let response = post_json(
        &app,
        "/api/v1/internal/notifications/events",
        Some(INTERNAL_SECRET),
        event_body("doc_2"),
    )
    .await;
    assert_eq!(body_json(response).await["data"]["trigger"], "scheduled");
}

#[tokio::test]
async fn event_without_channel_is_rejected() {
    let app = build_test_app();
    let mut body = event_body("doc_1");
    body["channel"] = json!("");

    let response = post_json(
        &app,
        "/api/v1/internal/notifications/events",
        Some(INTERNAL_SECRET),
        body,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}
