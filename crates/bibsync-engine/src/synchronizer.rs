//! Generic diff-and-fetch synchronizer
//!
//! Reconciles one object kind (collections, items, or tags) in one
//! direction. The same two routines serve all three kinds; nothing here is
//! kind-specific beyond the `ObjectKind` tag.
//!
//! ## Download
//!
//! The remote is asked for every key changed since the group's per-kind
//! watermark. Each key's local (version, status) is read through the
//! store, which creates an `Incomplete` placeholder for first-seen keys —
//! so the diff needs no separate existence check. A key whose local
//! status is not reconcilable (a locally `Modified` object the remote
//! also changed) is an unresolved conflict: it is skipped and reported,
//! never silently overwritten. The rest are fetched in chunks of at most
//! 50 and persisted as `Synced`.
//!
//! ## Upload
//!
//! All local objects with status `New` or `Modified` are sent in batches
//! of at most 50, conditional on the last known remote high-water
//! version. Per-index results are applied object by object; `failed`
//! entries get exactly one bounded retry batch before being surfaced and
//! left dirty for the next cycle. For items, upload runs BEFORE download:
//! the captured watermark must not already reflect this client's own
//! upload, or unrelated remote changes stamped between would be silently
//! skipped on the next cycle.

use std::sync::Arc;

use tracing::{debug, info, warn};

use bibsync_core::domain::{
    Group, ObjectKey, ObjectKind, SyncObject, SyncStatus, Version,
};
use bibsync_core::ports::library_service::{WriteFailure, FETCH_BATCH_LIMIT};
use bibsync_core::ports::{LibraryService, VersionedStore};

/// Result of one download pass for one object kind
#[derive(Debug, Default)]
pub struct DownloadOutcome {
    /// Objects fetched and persisted as Synced
    pub fetched: u64,
    /// Keys skipped as unresolved conflicts
    pub conflicts: Vec<ObjectKey>,
    /// Attachment items whose binary content may need downloading
    pub attachments: Vec<SyncObject>,
    /// Maximum Last-Modified-Version observed (watermark candidate)
    pub last_modified: Option<Version>,
}

/// Result of one upload pass for one object kind
#[derive(Debug, Default)]
pub struct UploadOutcome {
    /// Objects confirmed written (created or updated)
    pub uploaded: u64,
    /// Objects the remote reported as identical
    pub unchanged: u64,
    /// Local tombstones propagated to the remote
    pub deletions_pushed: u64,
    /// Objects still failing after the bounded retry
    pub failed: Vec<(Option<ObjectKey>, WriteFailure)>,
    /// Attachment-type items that went through the metadata upload
    pub attachments: Vec<SyncObject>,
    /// Maximum Last-Modified-Version observed (watermark candidate)
    pub last_modified: Option<Version>,
}

/// Reconciles one object kind between the store and the remote service
pub struct ObjectSynchronizer {
    service: Arc<dyn LibraryService>,
    store: Arc<dyn VersionedStore>,
}

impl ObjectSynchronizer {
    /// Creates a synchronizer over the given ports
    pub fn new(service: Arc<dyn LibraryService>, store: Arc<dyn VersionedStore>) -> Self {
        Self { service, store }
    }

    // ========================================================================
    // Download path
    // ========================================================================

    /// Downloads remote changes of one kind since the group's watermark
    #[tracing::instrument(skip(self, group), fields(library = %group.id()))]
    pub async fn download(&self, group: &Group, kind: ObjectKind) -> anyhow::Result<DownloadOutcome> {
        let library = group.id();
        let since = group.watermark(kind);
        let mut outcome = DownloadOutcome::default();

        let listing = self.service.list_versions(library, kind, since).await?;
        outcome.last_modified = Some(listing.last_modified);

        // Sort for deterministic batching; HashMap order is arbitrary.
        let mut changed: Vec<(ObjectKey, Version)> = listing.versions.into_iter().collect();
        changed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut to_fetch: Vec<ObjectKey> = Vec::new();
        for (key, remote_version) in changed {
            let (local_version, status) =
                self.store.version_and_status(library, kind, &key).await?;

            if !status.is_reconcilable() {
                warn!(
                    %key,
                    %status,
                    local = %local_version,
                    remote = %remote_version,
                    "Unresolved conflict: local object modified while remote advanced; skipping"
                );
                outcome.conflicts.push(key);
                continue;
            }

            if local_version < remote_version {
                to_fetch.push(key);
            }
        }

        debug!(
            kind = %kind,
            since = %since,
            to_fetch = to_fetch.len(),
            conflicts = outcome.conflicts.len(),
            "Download diff computed"
        );

        for chunk in to_fetch.chunks(FETCH_BATCH_LIMIT) {
            let objects = self.service.fetch_objects(library, kind, chunk).await?;
            for remote in objects {
                let mut object = match self.store.object(library, kind, &remote.key).await? {
                    Some(mut existing) => {
                        existing.set_data(remote.data);
                        existing.mark_synced(remote.version);
                        existing
                    }
                    None => SyncObject::from_remote(
                        library,
                        kind,
                        remote.key.clone(),
                        remote.version,
                        remote.data,
                    ),
                };

                // Trashed objects arrive through the same fetch
                // (includeTrashed); mirror their tombstone state.
                if payload_deleted(object.data()) {
                    object.mark_deleted();
                } else if object.is_deleted() {
                    object.unmark_deleted();
                }

                if object.is_attachment() && !object.is_deleted() {
                    outcome.attachments.push(object.clone());
                }

                self.store.save_object(&object).await?;
                outcome.fetched += 1;
            }
        }

        info!(
            kind = %kind,
            fetched = outcome.fetched,
            conflicts = outcome.conflicts.len(),
            "Download pass complete"
        );
        Ok(outcome)
    }

    // ========================================================================
    // Upload path
    // ========================================================================

    /// Uploads local changes of one kind, then propagates local tombstones
    #[tracing::instrument(skip(self, group), fields(library = %group.id()))]
    pub async fn upload(&self, group: &Group, kind: ObjectKind) -> anyhow::Result<UploadOutcome> {
        let library = group.id();
        let mut outcome = UploadOutcome::default();

        // The precondition version advances with our own writes so later
        // chunks are not rejected by the version the earlier ones minted.
        let mut base_version = group.watermark(kind);

        let pending = self.store.pending_upload(library, kind).await?;
        debug!(kind = %kind, pending = pending.len(), "Upload pass starting");

        for chunk in pending.chunks(FETCH_BATCH_LIMIT) {
            let payloads: Vec<serde_json::Value> = chunk.iter().map(upload_payload).collect();
            let result = self
                .service
                .write_objects(library, kind, &payloads, base_version)
                .await?;
            if let Some(v) = result.last_modified {
                base_version = base_version.max(v);
                outcome.last_modified =
                    Some(outcome.last_modified.map_or(v, |lm| lm.max(v)));
            }

            let failures = self.apply_write_result(chunk, &result, &mut outcome).await?;

            if !failures.is_empty() {
                // One bounded retry for the failed entries, then report
                // and continue with the remainder.
                let retry_objects: Vec<SyncObject> =
                    failures.iter().map(|(obj, _)| obj.clone()).collect();
                let retry_payloads: Vec<serde_json::Value> =
                    retry_objects.iter().map(upload_payload).collect();
                let retry_result = self
                    .service
                    .write_objects(library, kind, &retry_payloads, base_version)
                    .await?;
                if let Some(v) = retry_result.last_modified {
                    base_version = base_version.max(v);
                    outcome.last_modified =
                        Some(outcome.last_modified.map_or(v, |lm| lm.max(v)));
                }

                let still_failing = self
                    .apply_write_result(&retry_objects, &retry_result, &mut outcome)
                    .await?;

                for (object, failure) in still_failing {
                    warn!(
                        kind = %kind,
                        key = ?object.key().map(ObjectKey::as_str),
                        code = failure.code,
                        message = %failure.message,
                        "Object write failed after retry; leaving dirty for next cycle"
                    );
                    if let Some(key) = object.key() {
                        self.store
                            .set_status(library, kind, key, SyncStatus::Modified)
                            .await?;
                    }
                    outcome.failed.push((object.key().cloned(), failure));
                }
            }
        }

        self.push_local_deletions(group, kind, base_version, &mut outcome)
            .await?;

        info!(
            kind = %kind,
            uploaded = outcome.uploaded,
            unchanged = outcome.unchanged,
            failed = outcome.failed.len(),
            deletions = outcome.deletions_pushed,
            "Upload pass complete"
        );
        Ok(outcome)
    }

    /// Applies one batch write result; returns the entries that failed
    async fn apply_write_result(
        &self,
        chunk: &[SyncObject],
        result: &bibsync_core::ports::library_service::WriteOutcome,
        outcome: &mut UploadOutcome,
    ) -> anyhow::Result<Vec<(SyncObject, WriteFailure)>> {
        let library = chunk.first().map(SyncObject::library);

        for (index, written) in &result.success {
            let Some(object) = chunk.get(*index) else {
                anyhow::bail!("write result index {index} out of range");
            };
            let mut updated = object.clone();
            updated.assign_key(written.key.clone())?;
            updated.mark_synced(written.version);
            self.store.save_object(&updated).await?;
            outcome.uploaded += 1;
            if matches!(
                updated.item_type(),
                Some(bibsync_core::domain::ItemType::Attachment)
            ) {
                outcome.attachments.push(updated);
            }
        }

        for (index, key) in &result.unchanged {
            let Some(object) = chunk.get(*index) else {
                anyhow::bail!("write result index {index} out of range");
            };
            if let (Some(library), Some(_)) = (library, object.key()) {
                self.store
                    .set_status(library, object.kind(), key, SyncStatus::Synced)
                    .await?;
            }
            outcome.unchanged += 1;
        }

        let mut failures = Vec::new();
        for (index, failure) in &result.failed {
            let Some(object) = chunk.get(*index) else {
                anyhow::bail!("write result index {index} out of range");
            };
            failures.push((object.clone(), failure.clone()));
        }
        Ok(failures)
    }

    /// Propagates locally tombstoned objects to the remote
    async fn push_local_deletions(
        &self,
        group: &Group,
        kind: ObjectKind,
        base_version: Version,
        outcome: &mut UploadOutcome,
    ) -> anyhow::Result<()> {
        let library = group.id();
        let doomed = self.store.pending_local_deletions(library, kind).await?;
        if doomed.is_empty() {
            return Ok(());
        }

        let keys: Vec<ObjectKey> = doomed.iter().filter_map(|o| o.key().cloned()).collect();
        for chunk in keys.chunks(FETCH_BATCH_LIMIT) {
            self.service
                .delete_objects(library, kind, chunk, base_version)
                .await?;
            for key in chunk {
                // Tombstone confirmed remotely; the row settles as Synced.
                self.store
                    .set_status(library, kind, key, SyncStatus::Synced)
                    .await?;
            }
            outcome.deletions_pushed += chunk.len() as u64;
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds the wire payload for one local object
///
/// Keyed objects carry their key and last confirmed version so the remote
/// can apply per-object optimistic concurrency on top of the batch-level
/// precondition header.
fn upload_payload(object: &SyncObject) -> serde_json::Value {
    let mut payload = object.data().clone();
    if !payload.is_object() {
        payload = serde_json::json!({});
    }
    if let Some(map) = payload.as_object_mut() {
        if let Some(key) = object.key() {
            map.insert("key".to_string(), serde_json::json!(key.as_str()));
            map.insert(
                "version".to_string(),
                serde_json::json!(object.version().as_u64()),
            );
        }
    }
    payload
}

/// Reads the tombstone flag out of an opaque remote payload
fn payload_deleted(data: &serde_json::Value) -> bool {
    match data.get("deleted") {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_u64() == Some(1),
        _ => false,
    }
}
