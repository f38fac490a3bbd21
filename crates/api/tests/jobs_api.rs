//! Integration tests for job submission, progress streams and packages.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, post_json, submit_and_finish, CREATOR, NARRATIVE};
use http_body_util::BodyExt;
use serde_json::json;
use taleforge_core::package::PackageStatus;

// ---------------------------------------------------------------------------
// Test: POST /api/v1/jobs accepts a narrative and the pipeline completes it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_job_returns_202_and_completes() {
    let app = common::build_test_app();

    let response = post_json(
        &app,
        "/api/v1/jobs",
        json!({ "text": NARRATIVE, "user_id": "user-1", "creator_address": CREATOR }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let json = body_json(response).await;
    let id = json["data"]["job_id"].as_str().unwrap().parse().unwrap();

    let package = common::wait_for_terminal(&app, id).await;
    assert_eq!(package.status, PackageStatus::Completed);
    assert_eq!(package.visuals.len(), 3);
    assert_eq!(package.creator_address.as_deref(), Some(CREATOR));
}

// ---------------------------------------------------------------------------
// Test: Resubmitting the same narrative returns 409 with the first package id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_submission_returns_409() {
    let app = common::build_test_app();
    let first = submit_and_finish(&app, None).await;

    // Another user submitting the same text still collides.
    let response = post_json(
        &app,
        "/api/v1/jobs",
        json!({ "text": NARRATIVE, "user_id": "user-2" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["code"], "DUPLICATE_CONTENT");
    assert_eq!(json["package_id"], first.id.to_string());
}

// ---------------------------------------------------------------------------
// Test: Too-short narratives are rejected before anything is stored
// ---------------------------------------------------------------------------

#[tokio::test]
async fn short_text_returns_400() {
    let app = common::build_test_app();

    let response = post_json(
        &app,
        "/api/v1/jobs",
        json!({ "text": "too short", "user_id": "user-1" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn malformed_creator_address_returns_400() {
    let app = common::build_test_app();

    let response = post_json(
        &app,
        "/api/v1/jobs",
        json!({ "text": NARRATIVE, "user_id": "user-1", "creator_address": "not-an-address" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: GET /api/v1/packages/{id}
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_package_returns_completed_package() {
    let app = common::build_test_app();
    let package = submit_and_finish(&app, Some(CREATOR)).await;

    let response = get(&app, &format!("/api/v1/packages/{}", package.id)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["id"], package.id.to_string());
    assert_eq!(json["data"]["status"], "completed");
    assert_eq!(json["data"]["visuals"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn narrative_text_is_only_shown_to_its_owner() {
    let app = common::build_test_app();
    let package = submit_and_finish(&app, Some(CREATOR)).await;
    let path = format!("/api/v1/packages/{}", package.id);

    let anonymous = body_json(get(&app, &path).await).await;
    assert_eq!(anonymous["data"]["record"]["text"], "");
    assert_eq!(anonymous["data"]["status"], "completed");

    let other = body_json(get(&app, &format!("{path}?user_id=user-2")).await).await;
    assert_eq!(other["data"]["record"]["text"], "");

    let owner = body_json(get(&app, &format!("{path}?user_id=user-1")).await).await;
    assert_eq!(owner["data"]["record"]["text"], NARRATIVE);
}

#[tokio::test]
async fn unknown_package_returns_404() {
    let app = common::build_test_app();

    let response = get(&app, &format!("/api/v1/packages/{}", uuid::Uuid::new_v4())).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Test: Only the submitting user may change visibility
// ---------------------------------------------------------------------------

#[tokio::test]
async fn visibility_is_owner_only() {
    let app = common::build_test_app();
    let package = submit_and_finish(&app, None).await;
    let uri = format!("/api/v1/packages/{}/visibility", package.id);

    let response = post_json(&app, &uri, json!({ "user_id": "user-2", "is_public": true })).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = post_json(&app, &uri, json!({ "user_id": "user-1", "is_public": true })).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["is_public"], true);
}

// ---------------------------------------------------------------------------
// Test: Progress stream for a finished job replays the terminal event
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_for_finished_job_end_with_terminal_event() {
    let app = common::build_test_app();
    let package = submit_and_finish(&app, None).await;

    let response = get(&app, &format!("/api/v1/jobs/{}/events", package.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();

    let connected = body.find("event: connected").expect("connected event");
    let completed = body.find("event: completed").expect("completed event");
    assert!(connected < completed);
    assert_eq!(app.progress.active_topics(), 0);
}

#[tokio::test]
async fn events_for_unknown_job_return_404() {
    let app = common::build_test_app();

    let response = get(&app, &format!("/api/v1/jobs/{}/events", uuid::Uuid::new_v4())).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
