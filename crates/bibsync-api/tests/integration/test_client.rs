//! Integration tests for request plumbing: rate-limit compliance and
//! conflict-status mapping against a wiremock server.

use std::time::{Duration, Instant};

use bibsync_api::ApiError;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_retry_after_reissues_request() {
    let (server, client) = common::setup_api_mock().await;

    // First response throttles with a short Retry-After, then succeeds.
    Mock::given(method("GET"))
        .and(path("/keys/current"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/keys/current"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"userID": 1001, "username": "r"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let start = Instant::now();
    let info = bibsync_api::versions::verify_key(&client).await.unwrap();
    assert_eq!(info.user_id, 1001);
    // The mandated one-second pause was honored before the re-issue.
    assert!(start.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_backoff_header_delays_next_call() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/keys/current"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Backoff", "1")
                .set_body_json(serde_json::json!({"userID": 1001, "username": "r"})),
        )
        .mount(&server)
        .await;

    // First call succeeds immediately but arms the advisory cooldown.
    bibsync_api::versions::verify_key(&client).await.unwrap();
    assert!(client.governor().cooldown_remaining().is_some());

    // The second call holds until the cooldown expires.
    let start = Instant::now();
    bibsync_api::versions::verify_key(&client).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(900));
}

async fn mount_status(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/groups/451"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_409_maps_to_library_locked() {
    let (server, client) = common::setup_api_mock().await;
    mount_status(&server, 409).await;

    let err = bibsync_api::versions::group(&client, lib(451)).await.unwrap_err();
    assert!(matches!(err, ApiError::LibraryLocked(_)));
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_412_maps_to_version_mismatch() {
    let (server, client) = common::setup_api_mock().await;
    mount_status(&server, 412).await;

    let err = bibsync_api::versions::group(&client, lib(451)).await.unwrap_err();
    assert!(matches!(err, ApiError::VersionMismatch(_)));
}

#[tokio::test]
async fn test_428_maps_to_missing_precondition() {
    let (server, client) = common::setup_api_mock().await;
    mount_status(&server, 428).await;

    let err = bibsync_api::versions::group(&client, lib(451)).await.unwrap_err();
    assert!(matches!(err, ApiError::MissingPrecondition(_)));
}

#[tokio::test]
async fn test_other_errors_are_plain_http() {
    let (server, client) = common::setup_api_mock().await;
    mount_status(&server, 500).await;

    let err = bibsync_api::versions::group(&client, lib(451)).await.unwrap_err();
    match err {
        ApiError::Http { status, .. } => assert_eq!(status.as_u16(), 500),
        other => panic!("expected Http error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_auth_header_reaches_server() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/keys/current"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"userID": 1001, "username": "r"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    bibsync_api::versions::verify_key(&client).await.unwrap();
}

fn lib(id: i64) -> bibsync_core::domain::newtypes::LibraryId {
    bibsync_core::domain::newtypes::LibraryId::new(id).unwrap()
}
