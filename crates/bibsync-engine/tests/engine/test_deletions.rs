//! Deletion propagation tests: remote tombstones under the direction
//! policy, idempotence, and local-deletion push.

use bibsync_core::domain::{
    ObjectKind, SyncDirection, SyncObject, SyncStatus, Version,
};
use bibsync_core::ports::library_service::RemoteDeletions;
use bibsync_core::ports::VersionedStore;
use serde_json::json;

use crate::common::{key, lib, Fixture};

async fn seed_synced_item(fixture: &Fixture, k: &str, version: u64) {
    let obj = SyncObject::from_remote(
        lib(451),
        ObjectKind::Item,
        key(k),
        Version::new(version),
        json!({"itemType": "book", "title": format!("item {k}")}),
    );
    fixture.store.save_object(&obj).await.unwrap();
}

fn tombstone_items(fixture: &Fixture, keys: &[&str], last_modified: u64) {
    let mut state = fixture.remote.state.lock().unwrap();
    state.deleted = RemoteDeletions {
        items: keys.iter().map(|k| key(k)).collect(),
        last_modified: Version::new(last_modified),
        ..RemoteDeletions::default()
    };
}

#[tokio::test]
async fn test_clean_remote_delete_of_synced_object() {
    let fixture = Fixture::new().await;
    let group = fixture.seed_group(SyncDirection::BothCloud, 0).await;

    seed_synced_item(&fixture, "ABCD2345", 5).await;
    tombstone_items(&fixture, &["ABCD2345"], 8);

    let report = fixture.orchestrator.sync_group(&group).await;
    assert!(report.is_clean());
    assert_eq!(report.deleted, 1);

    let obj = fixture
        .store
        .object(lib(451), ObjectKind::Item, &key("ABCD2345"))
        .await
        .unwrap()
        .unwrap();
    assert!(obj.is_deleted());
    assert_eq!(obj.status(), SyncStatus::Synced);
}

#[tokio::test]
async fn test_applying_the_same_tombstones_twice_is_idempotent() {
    let fixture = Fixture::new().await;
    let group = fixture.seed_group(SyncDirection::BothCloud, 0).await;

    seed_synced_item(&fixture, "ABCD2345", 5).await;
    tombstone_items(&fixture, &["ABCD2345"], 8);

    let first = fixture.orchestrator.sync_group(&group).await;
    assert_eq!(first.deleted, 1);

    let group = fixture.group().await;
    let second = fixture.orchestrator.sync_group(&group).await;
    assert!(second.is_clean());
    assert_eq!(second.deleted, 0, "replaying the feed changes nothing");

    let obj = fixture
        .store
        .object(lib(451), ObjectKind::Item, &key("ABCD2345"))
        .await
        .unwrap()
        .unwrap();
    assert!(obj.is_deleted());
    assert_eq!(obj.status(), SyncStatus::Synced);
}

#[tokio::test]
async fn test_tombstone_for_unknown_key_is_a_noop() {
    let fixture = Fixture::new().await;
    let group = fixture.seed_group(SyncDirection::BothCloud, 0).await;

    tombstone_items(&fixture, &["ZZZZ9999"], 4);

    let report = fixture.orchestrator.sync_group(&group).await;
    assert!(report.is_clean());
    assert_eq!(report.deleted, 0);
}

#[tokio::test]
async fn test_remote_wins_discards_local_uncommitted_change() {
    let fixture = Fixture::new().await;
    // BothCloud: remote authoritative for deletes.
    let group = fixture.seed_group(SyncDirection::BothCloud, 0).await;

    let mut obj = SyncObject::from_remote(
        lib(451),
        ObjectKind::Item,
        key("ABCD2345"),
        Version::new(5),
        json!({"itemType": "book", "title": "dirty local"}),
    );
    obj.mark_modified();
    fixture.store.save_object(&obj).await.unwrap();

    tombstone_items(&fixture, &["ABCD2345"], 9);

    let report = fixture.orchestrator.sync_group(&group).await;
    assert_eq!(report.deleted, 1);

    let obj = fixture
        .store
        .object(lib(451), ObjectKind::Item, &key("ABCD2345"))
        .await
        .unwrap()
        .unwrap();
    assert!(obj.is_deleted(), "the local uncommitted change is discarded");
    assert_eq!(obj.status(), SyncStatus::Synced);
}

#[tokio::test]
async fn test_local_wins_resurrects_by_reupload() {
    let fixture = Fixture::new().await;
    // BothLocal: local authoritative; the tombstone is rejected.
    let group = fixture.seed_group(SyncDirection::BothLocal, 0).await;

    let mut obj = SyncObject::from_remote(
        lib(451),
        ObjectKind::Item,
        key("ABCD2345"),
        Version::new(5),
        json!({"itemType": "book", "title": "survives"}),
    );
    obj.mark_modified();
    fixture.store.save_object(&obj).await.unwrap();

    // The dirty object would normally upload during the Uploading phase;
    // keep it held back so the tombstone meets it: fail its write.
    {
        let mut state = fixture.remote.state.lock().unwrap();
        state.fail_titles.insert("survives".to_string());
        state.library_version = 9;
    }
    tombstone_items(&fixture, &["ABCD2345"], 9);

    let report = fixture.orchestrator.sync_group(&group).await;
    assert_eq!(report.deleted, 0);

    let obj = fixture
        .store
        .object(lib(451), ObjectKind::Item, &key("ABCD2345"))
        .await
        .unwrap()
        .unwrap();
    assert!(!obj.is_deleted(), "the tombstone was rejected");
    assert_eq!(obj.status(), SyncStatus::Modified);
    // Re-stamped to the feed's version so the next upload passes the
    // remote's precondition and recreates the object.
    assert_eq!(obj.version(), Version::new(9));

    let pending = fixture
        .store
        .pending_upload(lib(451), ObjectKind::Item)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1, "resurrection happens on the next upload");

    // Clear the scripted failure: the next cycle re-uploads it.
    fixture.remote.state.lock().unwrap().fail_titles.clear();
    let group = fixture.group().await;
    let report = fixture.orchestrator.sync_group(&group).await;
    assert!(report.uploaded >= 1);

    let obj = fixture
        .store
        .object(lib(451), ObjectKind::Item, &key("ABCD2345"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(obj.status(), SyncStatus::Synced);
}

#[tokio::test]
async fn test_local_cascade_delete_propagates_to_remote() {
    let fixture = Fixture::new().await;
    let group = fixture.seed_group(SyncDirection::BothCloud, 0).await;

    // A parent item with an attached child, both synced.
    seed_synced_item(&fixture, "PPPP2345", 3).await;
    let child = SyncObject::from_remote(
        lib(451),
        ObjectKind::Item,
        key("CCCC2345"),
        Version::new(3),
        json!({"itemType": "note", "parentItem": "PPPP2345"}),
    );
    fixture.store.save_object(&child).await.unwrap();
    fixture.remote.seed_object(
        ObjectKind::Item,
        "PPPP2345",
        3,
        json!({"itemType": "book", "title": "item PPPP2345"}),
    );
    fixture.remote.seed_object(
        ObjectKind::Item,
        "CCCC2345",
        3,
        json!({"itemType": "note", "parentItem": "PPPP2345"}),
    );

    // The local front-end deletes the parent; children cascade first.
    fixture
        .store
        .mark_deleted_cascade(lib(451), &key("PPPP2345"))
        .await
        .unwrap();

    let report = fixture.orchestrator.sync_group(&group).await;
    assert!(report.is_clean(), "errors: {:?}", report.errors());

    // Both tombstones reached the remote in one batch.
    let calls = fixture.remote.calls.lock().unwrap();
    assert_eq!(calls.delete_batches, vec![2]);
    drop(calls);

    let remote_state = fixture.remote.state.lock().unwrap();
    let items = remote_state.objects.get(&ObjectKind::Item).unwrap();
    assert!(!items.contains_key("PPPP2345"));
    assert!(!items.contains_key("CCCC2345"));
    drop(remote_state);

    // Local tombstones settle as Synced once confirmed.
    for k in ["PPPP2345", "CCCC2345"] {
        let obj = fixture
            .store
            .object(lib(451), ObjectKind::Item, &key(k))
            .await
            .unwrap()
            .unwrap();
        assert!(obj.is_deleted());
        assert_eq!(obj.status(), SyncStatus::Synced);
    }
}
