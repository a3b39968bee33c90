//! Integration tests for version listings and the tombstone feed
//!
//! Verifies end-to-end behavior against a wiremock server:
//! - single-page and paginated `format=versions` listings
//! - Last-Modified-Version tracking across pages
//! - the deletion feed
//! - group listing and metadata queries

use bibsync_core::domain::newtypes::{LibraryId, ObjectKey, Version};
use bibsync_core::domain::object::ObjectKind;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn lib(id: i64) -> LibraryId {
    LibraryId::new(id).unwrap()
}

#[tokio::test]
async fn test_list_versions_single_page() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/groups/451/items"))
        .and(query_param("format", "versions"))
        .and(query_param("since", "10"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified-Version", "42")
                .insert_header("Total-Results", "2")
                .set_body_json(serde_json::json!({
                    "ABCD2345": 41,
                    "WXYZ7892": 42
                })),
        )
        .mount(&server)
        .await;

    let listing = bibsync_api::versions::list_object_versions(
        &client,
        lib(451),
        ObjectKind::Item,
        Version::new(10),
        100,
    )
    .await
    .unwrap();

    assert_eq!(listing.versions.len(), 2);
    assert_eq!(listing.last_modified, Version::new(42));
    let key = ObjectKey::new("ABCD2345").unwrap();
    assert_eq!(listing.versions[&key], Version::new(41));
}

#[tokio::test]
async fn test_list_versions_follows_pagination() {
    let (server, client) = common::setup_api_mock().await;

    // Three keys total, page size two: expect a second request at start=2.
    Mock::given(method("GET"))
        .and(path("/groups/451/collections"))
        .and(query_param("start", "0"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified-Version", "50")
                .insert_header("Total-Results", "3")
                .set_body_json(serde_json::json!({
                    "AAAA2345": 48,
                    "BBBB2345": 49
                })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/groups/451/collections"))
        .and(query_param("start", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified-Version", "51")
                .insert_header("Total-Results", "3")
                .set_body_json(serde_json::json!({
                    "CCCC2345": 51
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let listing = bibsync_api::versions::list_object_versions(
        &client,
        lib(451),
        ObjectKind::Collection,
        Version::ZERO,
        2,
    )
    .await
    .unwrap();

    assert_eq!(listing.versions.len(), 3);
    // The maximum header across all pages wins.
    assert_eq!(listing.last_modified, Version::new(51));
}

#[tokio::test]
async fn test_list_versions_empty() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/groups/451/tags"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified-Version", "7")
                .insert_header("Total-Results", "0")
                .set_body_json(serde_json::json!({})),
        )
        .mount(&server)
        .await;

    let listing = bibsync_api::versions::list_object_versions(
        &client,
        lib(451),
        ObjectKind::Tag,
        Version::ZERO,
        100,
    )
    .await
    .unwrap();

    assert!(listing.versions.is_empty());
    assert_eq!(listing.last_modified, Version::new(7));
}

#[tokio::test]
async fn test_list_versions_missing_header_is_an_error() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/groups/451/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let result = bibsync_api::versions::list_object_versions(
        &client,
        lib(451),
        ObjectKind::Item,
        Version::ZERO,
        100,
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_deletions_feed() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/groups/451/deleted"))
        .and(query_param("since", "30"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified-Version", "44")
                .set_body_json(serde_json::json!({
                    "collections": ["AAAA2345"],
                    "items": ["BBBB2345", "CCCC2345"],
                    "tags": []
                })),
        )
        .mount(&server)
        .await;

    let deletions = bibsync_api::versions::deletions(&client, lib(451), Version::new(30))
        .await
        .unwrap();

    assert_eq!(deletions.collections.len(), 1);
    assert_eq!(deletions.items.len(), 2);
    assert!(deletions.tags.is_empty());
    assert_eq!(deletions.last_modified, Version::new(44));
}

#[tokio::test]
async fn test_deletions_skips_malformed_keys() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/groups/451/deleted"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified-Version", "44")
                .set_body_json(serde_json::json!({
                    "items": ["BBBB2345", "not-a-key"]
                })),
        )
        .mount(&server)
        .await;

    let deletions = bibsync_api::versions::deletions(&client, lib(451), Version::ZERO)
        .await
        .unwrap();
    assert_eq!(deletions.items.len(), 1);
}

#[tokio::test]
async fn test_group_versions_listing() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path(format!("/users/{}/groups", common::TEST_USER)))
        .and(query_param("format", "versions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "451": 92,
            "452": 7
        })))
        .mount(&server)
        .await;

    let versions = bibsync_api::versions::group_versions(&client).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[&lib(451)], Version::new(92));
    assert_eq!(versions[&lib(452)], Version::new(7));
}

#[tokio::test]
async fn test_group_metadata() {
    let (server, client) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/groups/451"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 451,
            "version": 92,
            "data": {"name": "Reading Group", "owner": 1001}
        })))
        .mount(&server)
        .await;

    let group = bibsync_api::versions::group(&client, lib(451)).await.unwrap();
    assert_eq!(group.id, lib(451));
    assert_eq!(group.version, Version::new(92));
    assert_eq!(group.data["name"], "Reading Group");
}
