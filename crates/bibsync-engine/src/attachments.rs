//! Checksum-gated binary attachment transfer
//!
//! The MD5 digest is the sole signal for "binary content changed": it
//! gates both directions, so unchanged content never crosses the wire.
//!
//! Download happens only for items whose remote checksum is non-empty and
//! whose status is Synced — a confirmed incoming update, never a
//! speculative fetch. Upload runs the remote's three-step protocol and
//! short-circuits twice: locally, when the blob digest equals the last
//! confirmed remote digest (zero remote calls), and remotely, when the
//! authorization step answers that the content already exists.

use std::sync::Arc;

use md5::{Digest, Md5};
use tracing::{debug, info, warn};

use bibsync_core::domain::{Group, ObjectKey, SyncObject, SyncStatus};
use bibsync_core::ports::library_service::{
    RegisterOutcome, UploadAuthorization, UploadRequest,
};
use bibsync_core::ports::{BlobStore, LibraryService, VersionedStore};

/// What an attachment upload attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferResult {
    /// Nothing to do (no local blob, or content unchanged)
    Skipped,
    /// The remote already had this exact content
    AlreadyPresent,
    /// The binary payload was transferred
    Transferred,
    /// The remote content changed concurrently (412 at registration);
    /// the attachment is retried from step 1 on the next cycle
    Deferred,
}

/// Moves attachment binaries between the blob store and the remote
pub struct AttachmentTransfer {
    service: Arc<dyn LibraryService>,
    store: Arc<dyn VersionedStore>,
    vault: Arc<dyn BlobStore>,
}

impl AttachmentTransfer {
    /// Creates a transfer over the given ports
    pub fn new(
        service: Arc<dyn LibraryService>,
        store: Arc<dyn VersionedStore>,
        vault: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            service,
            store,
            vault,
        }
    }

    // ========================================================================
    // Download
    // ========================================================================

    /// Downloads an attachment's binary if its checksum says it changed
    #[tracing::instrument(skip(self, group, item), fields(library = %group.id()))]
    pub async fn download(&self, group: &Group, item: &SyncObject) -> anyhow::Result<TransferResult> {
        let library = group.id();
        let Some(key) = item.key() else {
            return Ok(TransferResult::Skipped);
        };
        let Some(remote_md5) = item.md5() else {
            // No remote checksum: no binary content to mirror.
            return Ok(TransferResult::Skipped);
        };
        if item.status() != SyncStatus::Synced {
            // Only confirmed incoming updates trigger a binary download.
            return Ok(TransferResult::Skipped);
        }

        match self.vault.stat(library, key).await {
            Ok(stat) if stat.etag.as_deref() == Some(remote_md5) => {
                debug!(%key, "Blob already matches remote checksum");
                return Ok(TransferResult::Skipped);
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let content = self.service.download_attachment(library, key).await?;
        let local_etag = self.vault.put(library, key, &content.bytes).await?;
        // The transfer's ETag is authoritative; fall back to the locally
        // computed digest when the server omitted it.
        let checksum = content.etag.unwrap_or(local_etag);
        self.store.set_md5(library, key, &checksum).await?;

        info!(%key, size = content.bytes.len(), "Attachment downloaded");
        Ok(TransferResult::Transferred)
    }

    // ========================================================================
    // Upload
    // ========================================================================

    /// Uploads an attachment's binary through the three-step protocol
    #[tracing::instrument(skip(self, group, item), fields(library = %group.id()))]
    pub async fn upload(&self, group: &Group, item: &SyncObject) -> anyhow::Result<TransferResult> {
        let library = group.id();
        let Some(key) = item.key() else {
            return Ok(TransferResult::Skipped);
        };

        let bytes = match self.vault.get(library, key).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                debug!(%key, "No local blob for attachment; nothing to upload");
                return Ok(TransferResult::Skipped);
            }
            Err(e) => return Err(e.into()),
        };

        let digest = md5_hex(&bytes);
        let previous = item.md5();
        if previous == Some(digest.as_str()) {
            // Content unchanged: short-circuit before any remote call.
            debug!(%key, "Attachment content unchanged; skipping upload");
            return Ok(TransferResult::Skipped);
        }

        let request = UploadRequest {
            md5: digest.clone(),
            filename: attachment_filename(item, key),
            filesize: bytes.len() as u64,
            mtime: attachment_mtime(item),
        };

        let ticket = match self
            .service
            .authorize_upload(library, key, &request, previous)
            .await?
        {
            UploadAuthorization::Exists => {
                // The remote already has this content; record the digest.
                self.store.set_md5(library, key, &digest).await?;
                info!(%key, "Remote already has attachment content");
                return Ok(TransferResult::AlreadyPresent);
            }
            UploadAuthorization::Granted(ticket) => ticket,
        };

        self.service.upload_payload(&ticket, &bytes).await?;

        match self
            .service
            .register_upload(library, key, &ticket.upload_key, previous)
            .await?
        {
            RegisterOutcome::Registered => {
                self.store.set_md5(library, key, &digest).await?;
                info!(%key, size = bytes.len(), "Attachment uploaded");
                Ok(TransferResult::Transferred)
            }
            RegisterOutcome::ContentChanged => {
                warn!(
                    %key,
                    "Remote content changed during upload; deferring to next cycle"
                );
                Ok(TransferResult::Deferred)
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Computes the MD5 hex digest of attachment content
fn md5_hex(bytes: &[u8]) -> String {
    let digest = Md5::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Picks the filename to advertise in the authorization request
fn attachment_filename(item: &SyncObject, key: &ObjectKey) -> String {
    item.data()
        .get("filename")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| key.to_string())
}

/// Picks the mtime (milliseconds) to advertise in the authorization request
fn attachment_mtime(item: &SyncObject) -> i64 {
    item.data()
        .get("mtime")
        .and_then(serde_json::Value::as_i64)
        .or_else(|| item.modified_at().map(|d| d.timestamp_millis()))
        .unwrap_or(0)
}
