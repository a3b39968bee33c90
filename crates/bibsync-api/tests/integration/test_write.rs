//! Integration tests for batched writes, deletes, and fetches

use bibsync_core::domain::newtypes::{LibraryId, ObjectKey, Version};
use bibsync_core::domain::object::ObjectKind;
use bibsync_core::ports::library_service::FETCH_BATCH_LIMIT;
use bibsync_api::ApiError;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn lib(id: i64) -> LibraryId {
    LibraryId::new(id).unwrap()
}

fn key(s: &str) -> ObjectKey {
    ObjectKey::new(s).unwrap()
}

#[tokio::test]
async fn test_write_objects_mixed_results() {
    let (server, client) = common::setup_api_mock().await;

    let payloads = vec![
        serde_json::json!({"title": "created"}),
        serde_json::json!({"title": "conflicted"}),
        serde_json::json!({"title": "same"}),
    ];

    Mock::given(method("POST"))
        .and(path("/groups/451/items"))
        .and(header("If-Unmodified-Since-Version", "10"))
        .and(body_json(payloads.clone()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified-Version", "13")
                .set_body_json(serde_json::json!({
                    "success": {"0": "ABCD2345"},
                    "unchanged": {"2": "WXYZ7892"},
                    "failed": {"1": {"code": 412, "message": "outdated version"}}
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let outcome = bibsync_api::write::write_objects(
        &client,
        lib(451),
        ObjectKind::Item,
        &payloads,
        Version::new(10),
    )
    .await
    .unwrap();

    assert!(!outcome.is_fully_applied());
    assert_eq!(outcome.last_modified, Some(Version::new(13)));

    let created = &outcome.success[&0];
    assert_eq!(created.key, key("ABCD2345"));
    assert_eq!(created.version, Version::new(13));

    assert_eq!(outcome.unchanged[&2], key("WXYZ7892"));
    assert_eq!(outcome.failed[&1].code, 412);
    assert_eq!(outcome.failed[&1].message, "outdated version");
}

#[tokio::test]
async fn test_write_objects_rejects_oversized_batch() {
    let (_server, client) = common::setup_api_mock().await;

    let payloads = vec![serde_json::json!({}); FETCH_BATCH_LIMIT + 1];
    let err = bibsync_api::write::write_objects(
        &client,
        lib(451),
        ObjectKind::Item,
        &payloads,
        Version::ZERO,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ApiError::BatchTooLarge { limit: 50, len: 51 }));
}

#[tokio::test]
async fn test_write_objects_empty_batch_is_local_noop() {
    // No mock mounted: an empty batch must not touch the network.
    let (_server, client) = common::setup_api_mock().await;

    let outcome =
        bibsync_api::write::write_objects(&client, lib(451), ObjectKind::Item, &[], Version::ZERO)
            .await
            .unwrap();
    assert!(outcome.is_fully_applied());
    assert!(outcome.success.is_empty());
}

#[tokio::test]
async fn test_fetch_objects_batch() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/groups/451/items"))
        .and(query_param("itemKey", "ABCD2345,WXYZ7892"))
        .and(query_param("includeTrashed", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"key": "ABCD2345", "version": 41, "data": {"title": "First"}},
            {"key": "WXYZ7892", "version": 42, "data": {"title": "Second"}}
        ])))
        .mount(&server)
        .await;

    let objects = bibsync_api::write::fetch_objects(
        &client,
        lib(451),
        ObjectKind::Item,
        &[key("ABCD2345"), key("WXYZ7892")],
    )
    .await
    .unwrap();

    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0].key, key("ABCD2345"));
    assert_eq!(objects[0].version, Version::new(41));
    assert_eq!(objects[1].data["title"], "Second");
}

#[tokio::test]
async fn test_fetch_objects_uses_kind_specific_param() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/groups/451/collections"))
        .and(query_param("collectionKey", "AAAA2345"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"key": "AAAA2345", "version": 3, "data": {"name": "Drafts"}}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let objects = bibsync_api::write::fetch_objects(
        &client,
        lib(451),
        ObjectKind::Collection,
        &[key("AAAA2345")],
    )
    .await
    .unwrap();
    assert_eq!(objects.len(), 1);
}

#[tokio::test]
async fn test_fetch_objects_rejects_oversized_batch() {
    let (_server, client) = common::setup_api_mock().await;

    let keys: Vec<ObjectKey> = (0..FETCH_BATCH_LIMIT + 1)
        .map(|_| key("ABCD2345"))
        .collect();
    let err = bibsync_api::write::fetch_objects(&client, lib(451), ObjectKind::Item, &keys)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BatchTooLarge { .. }));
}

#[tokio::test]
async fn test_delete_objects_sends_conditional_header() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/groups/451/items"))
        .and(query_param("itemKey", "ABCD2345"))
        .and(header("If-Unmodified-Since-Version", "20"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    bibsync_api::write::delete_objects(
        &client,
        lib(451),
        ObjectKind::Item,
        &[key("ABCD2345")],
        Version::new(20),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_delete_objects_version_mismatch() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/groups/451/items"))
        .respond_with(ResponseTemplate::new(412))
        .mount(&server)
        .await;

    let err = bibsync_api::write::delete_objects(
        &client,
        lib(451),
        ObjectKind::Item,
        &[key("ABCD2345")],
        Version::new(20),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::VersionMismatch(_)));
}
