//! Attachment transfer tests: checksum gating in both directions, the
//! content-unchanged and already-exists short-circuits, and the deferred
//! concurrent-change case.

use bibsync_core::domain::{ObjectKind, SyncDirection, SyncObject, Version};
use bibsync_core::ports::{BlobStore, VersionedStore};
use bibsync_vault::md5_hex;
use serde_json::json;

use crate::common::{key, lib, Fixture};

const CONTENT: &[u8] = b"%PDF-1.4 fixture";

#[tokio::test]
async fn test_remote_attachment_is_downloaded_into_the_vault() {
    let fixture = Fixture::new().await;
    let group = fixture.seed_group(SyncDirection::BothCloud, 0).await;

    let md5 = md5_hex(CONTENT);
    fixture.remote.seed_object(
        ObjectKind::Item,
        "ABCD2345",
        4,
        json!({
            "itemType": "attachment",
            "filename": "scan.pdf",
            "md5": md5,
        }),
    );
    fixture
        .remote
        .state
        .lock()
        .unwrap()
        .attachments
        .insert("ABCD2345".to_string(), CONTENT.to_vec());

    let report = fixture.orchestrator.sync_group(&group).await;
    assert!(report.is_clean(), "errors: {:?}", report.errors());
    assert_eq!(report.attachments, 1);

    let stored = fixture.vault.get(lib(451), &key("ABCD2345")).await.unwrap();
    assert_eq!(stored, CONTENT);

    let item = fixture
        .store
        .object(lib(451), ObjectKind::Item, &key("ABCD2345"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.md5(), Some(md5.as_str()));
}

#[tokio::test]
async fn test_download_skipped_when_vault_already_matches() {
    let fixture = Fixture::new().await;
    let group = fixture.seed_group(SyncDirection::BothCloud, 0).await;

    let md5 = md5_hex(CONTENT);
    fixture.remote.seed_object(
        ObjectKind::Item,
        "ABCD2345",
        4,
        json!({"itemType": "attachment", "filename": "scan.pdf", "md5": md5}),
    );
    fixture
        .remote
        .state
        .lock()
        .unwrap()
        .attachments
        .insert("ABCD2345".to_string(), CONTENT.to_vec());

    // The blob is already present with the matching checksum.
    fixture
        .vault
        .put(lib(451), &key("ABCD2345"), CONTENT)
        .await
        .unwrap();

    let report = fixture.orchestrator.sync_group(&group).await;
    assert!(report.is_clean());
    assert_eq!(report.attachments, 0);
    assert_eq!(
        fixture.remote.calls.lock().unwrap().attachment_downloads,
        0,
        "matching checksum short-circuits the binary download"
    );
}

#[tokio::test]
async fn test_upload_short_circuits_on_identical_content() {
    // Re-uploading an attachment whose recomputed digest equals the last
    // confirmed remote digest issues no remote transfer calls at all.
    let fixture = Fixture::new().await;
    let group = fixture.seed_group(SyncDirection::BothCloud, 0).await;

    let md5 = md5_hex(CONTENT);
    let mut item = SyncObject::from_remote(
        lib(451),
        ObjectKind::Item,
        key("ABCD2345"),
        Version::new(4),
        json!({"itemType": "attachment", "filename": "scan.pdf", "md5": md5}),
    );
    item.mark_modified();
    fixture.store.save_object(&item).await.unwrap();
    fixture
        .vault
        .put(lib(451), &key("ABCD2345"), CONTENT)
        .await
        .unwrap();

    let report = fixture.orchestrator.sync_group(&group).await;
    assert!(report.is_clean(), "errors: {:?}", report.errors());

    let calls = fixture.remote.calls.lock().unwrap();
    assert_eq!(calls.authorizations, 0);
    assert_eq!(calls.payload_uploads, 0);
    assert_eq!(calls.registrations, 0);
}

#[tokio::test]
async fn test_upload_exists_short_circuit_after_authorization() {
    let fixture = Fixture::new().await;
    let group = fixture.seed_group(SyncDirection::BothCloud, 0).await;

    // Changed content locally, but the remote already has that digest.
    let new_content = b"updated bytes";
    let new_md5 = md5_hex(new_content);
    let mut item = SyncObject::from_remote(
        lib(451),
        ObjectKind::Item,
        key("ABCD2345"),
        Version::new(4),
        json!({
            "itemType": "attachment",
            "filename": "scan.pdf",
            "md5": md5_hex(CONTENT),
        }),
    );
    item.mark_modified();
    fixture.store.save_object(&item).await.unwrap();
    fixture
        .vault
        .put(lib(451), &key("ABCD2345"), new_content)
        .await
        .unwrap();
    fixture
        .remote
        .state
        .lock()
        .unwrap()
        .existing_md5s
        .insert(new_md5.clone());

    let report = fixture.orchestrator.sync_group(&group).await;
    assert!(report.is_clean(), "errors: {:?}", report.errors());

    let calls = fixture.remote.calls.lock().unwrap();
    assert_eq!(calls.authorizations, 1);
    assert_eq!(calls.payload_uploads, 0, "exists answer skips the transfer");
    assert_eq!(calls.registrations, 0);
    drop(calls);

    let item = fixture
        .store
        .object(lib(451), ObjectKind::Item, &key("ABCD2345"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.md5(), Some(new_md5.as_str()));
}

#[tokio::test]
async fn test_upload_full_three_step_protocol() {
    let fixture = Fixture::new().await;
    let group = fixture.seed_group(SyncDirection::BothCloud, 0).await;

    let new_content = b"fresh scan bytes";
    let new_md5 = md5_hex(new_content);
    let mut item = SyncObject::from_remote(
        lib(451),
        ObjectKind::Item,
        key("ABCD2345"),
        Version::new(4),
        json!({
            "itemType": "attachment",
            "filename": "scan.pdf",
            "mtime": 1_722_000_000_000i64,
            "md5": md5_hex(CONTENT),
        }),
    );
    item.mark_modified();
    fixture.store.save_object(&item).await.unwrap();
    fixture
        .vault
        .put(lib(451), &key("ABCD2345"), new_content)
        .await
        .unwrap();

    let report = fixture.orchestrator.sync_group(&group).await;
    assert!(report.is_clean(), "errors: {:?}", report.errors());
    assert_eq!(report.attachments, 1);

    let calls = fixture.remote.calls.lock().unwrap();
    assert_eq!(calls.authorizations, 1);
    assert_eq!(calls.payload_uploads, 1);
    assert_eq!(calls.registrations, 1);
    drop(calls);

    let item = fixture
        .store
        .object(lib(451), ObjectKind::Item, &key("ABCD2345"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.md5(), Some(new_md5.as_str()));
}

#[tokio::test]
async fn test_register_conflict_defers_to_next_cycle() {
    let fixture = Fixture::new().await;
    let group = fixture.seed_group(SyncDirection::BothCloud, 0).await;

    let old_md5 = md5_hex(CONTENT);
    let mut item = SyncObject::from_remote(
        lib(451),
        ObjectKind::Item,
        key("ABCD2345"),
        Version::new(4),
        json!({"itemType": "attachment", "filename": "scan.pdf", "md5": old_md5}),
    );
    item.mark_modified();
    fixture.store.save_object(&item).await.unwrap();
    fixture
        .vault
        .put(lib(451), &key("ABCD2345"), b"changed bytes")
        .await
        .unwrap();
    fixture.remote.state.lock().unwrap().register_conflict = true;

    let report = fixture.orchestrator.sync_group(&group).await;

    // The deferral is surfaced; the stored digest is NOT updated, so the
    // next cycle restarts the attachment sync from step 1.
    assert!(report
        .errors()
        .iter()
        .any(|e| e.message.contains("deferred")));
    assert_eq!(report.attachments, 0);

    let item = fixture
        .store
        .object(lib(451), ObjectKind::Item, &key("ABCD2345"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.md5(), Some(old_md5.as_str()));
}
