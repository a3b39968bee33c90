//! Remote library service port (driven/secondary port)
//!
//! Interface for the remotely hosted, versioned library service. The
//! primary implementation is the HTTP adapter in `bibsync-api`, but the
//! trait is transport-agnostic so engine tests can script it in process.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific and don't need domain-level classification. The
//!   adapter keeps its typed error as the source for downcasting.
//! - Payloads are opaque `serde_json::Value` pass-through; the engine
//!   never interprets remote field names.
//! - `fetch_objects` accepts at most [`FETCH_BATCH_LIMIT`] keys per call —
//!   the remote service's hard limit. Callers must chunk.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::newtypes::{LibraryId, ObjectKey, Version};
use crate::domain::object::ObjectKind;

/// The remote service's hard limit on keys per batch fetch and objects
/// per batch write
pub const FETCH_BATCH_LIMIT: usize = 50;

// ============================================================================
// DTOs
// ============================================================================

/// Result of one paginated version listing
///
/// `versions` maps every key changed since the caller's watermark to its
/// current remote version; `last_modified` is the highest
/// `Last-Modified-Version` header observed across the page loop and becomes
/// the caller's new watermark candidate.
#[derive(Debug, Clone, Default)]
pub struct VersionListing {
    /// Changed keys and their current remote versions
    pub versions: HashMap<ObjectKey, Version>,
    /// Maximum Last-Modified-Version observed while listing
    pub last_modified: Version,
}

/// One object returned by a batch fetch
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    /// Remote key
    pub key: ObjectKey,
    /// Current remote version
    pub version: Version,
    /// Opaque payload (the object's field content)
    pub data: serde_json::Value,
}

/// Remote metadata of one group/library
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteGroup {
    /// Library identifier
    pub id: LibraryId,
    /// Current whole-library version
    pub version: Version,
    /// Opaque group metadata payload
    pub data: serde_json::Value,
}

/// Per-object failure entry in a batch write result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFailure {
    /// Remote error code (e.g. 412 for a version mismatch)
    pub code: u16,
    /// Remote error message
    pub message: String,
}

/// A successfully written object: its key (remote-minted for creations)
/// and the version stamped by the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenObject {
    /// Assigned or confirmed key
    pub key: ObjectKey,
    /// Version the remote stamped on the write
    pub version: Version,
}

/// Structured per-object result of a batch write, keyed by request index
#[derive(Debug, Clone, Default)]
pub struct WriteOutcome {
    /// Index → written object (created or updated)
    pub success: BTreeMap<usize, WrittenObject>,
    /// Index → key of an object the remote found identical
    pub unchanged: BTreeMap<usize, ObjectKey>,
    /// Index → failure detail; never aborts sibling entries
    pub failed: BTreeMap<usize, WriteFailure>,
    /// Last-Modified-Version header of the write response
    pub last_modified: Option<Version>,
}

impl WriteOutcome {
    /// Returns true if every entry succeeded or was unchanged
    #[must_use]
    pub fn is_fully_applied(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Tombstone lists reported by the remote deletion feed
#[derive(Debug, Clone, Default)]
pub struct RemoteDeletions {
    /// Collections deleted since the caller's version
    pub collections: Vec<ObjectKey>,
    /// Items deleted since the caller's version
    pub items: Vec<ObjectKey>,
    /// Tag containers deleted since the caller's version
    pub tags: Vec<ObjectKey>,
    /// Last-Modified-Version of the deletion feed
    pub last_modified: Version,
}

impl RemoteDeletions {
    /// Returns the tombstones for one object kind
    #[must_use]
    pub fn for_kind(&self, kind: ObjectKind) -> &[ObjectKey] {
        match kind {
            ObjectKind::Collection => &self.collections,
            ObjectKind::Item => &self.items,
            ObjectKind::Tag => &self.tags,
        }
    }

    /// Returns the total tombstone count
    #[must_use]
    pub fn len(&self) -> usize {
        self.collections.len() + self.items.len() + self.tags.len()
    }

    /// Returns true if the feed reported no deletions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Information about the API key's owner and access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Owning user id
    pub user_id: i64,
    /// Owning user name
    pub username: String,
    /// Libraries this key may read
    pub readable: Vec<LibraryId>,
    /// Libraries this key may write
    pub writable: Vec<LibraryId>,
}

// ============================================================================
// Attachment transfer DTOs
// ============================================================================

/// Metadata sent with an upload authorization request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// MD5 hex digest of the content to upload
    pub md5: String,
    /// File name
    pub filename: String,
    /// Content size in bytes
    pub filesize: u64,
    /// Content modification time (milliseconds since the epoch)
    pub mtime: i64,
}

/// Ticket returned by a granted upload authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTicket {
    /// Presigned URL to PUT the framed payload to
    pub url: String,
    /// Content type the presigned endpoint expects
    pub content_type: String,
    /// Bytes to prepend to the payload
    pub prefix: String,
    /// Bytes to append to the payload
    pub suffix: String,
    /// Opaque token for the registration step
    pub upload_key: String,
}

/// Outcome of an upload authorization request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadAuthorization {
    /// The remote already has this exact content; nothing to transfer
    Exists,
    /// Upload authorized; proceed with the presigned PUT and registration
    Granted(UploadTicket),
}

/// Outcome of the upload registration step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The upload is registered; the remote now serves this content
    Registered,
    /// The remote content changed between authorization and registration
    /// (HTTP 412); the attachment sync restarts from step 1 on the NEXT
    /// cycle, not immediately
    ContentChanged,
}

/// Downloaded attachment content with its checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentContent {
    /// Raw bytes
    pub bytes: Vec<u8>,
    /// Checksum reported by the transfer's ETag, when present
    pub etag: Option<String>,
}

// ============================================================================
// LibraryService trait
// ============================================================================

/// Port trait for the remote versioned library service
///
/// ## Implementation Notes
///
/// - Rate-limit compliance (`Retry-After`, advisory `Backoff`) is the
///   adapter's responsibility: no method returns until any mandated sleep
///   has been honored, and transient throttling is never surfaced as an
///   error.
/// - Precondition failures (409 library locked, 412 version mismatch,
///   428 missing precondition) surface as distinct, non-retried errors.
/// - Pagination of version listings happens inside the adapter.
#[async_trait::async_trait]
pub trait LibraryService: Send + Sync {
    /// Lists the libraries visible to this API key with their current
    /// whole-library versions
    async fn group_versions(&self) -> anyhow::Result<HashMap<LibraryId, Version>>;

    /// Fetches one group's metadata
    async fn group(&self, library: LibraryId) -> anyhow::Result<RemoteGroup>;

    /// Lists keys of one kind changed since `since`, with their versions
    ///
    /// Returns every changed key (the adapter follows pagination) and the
    /// maximum `Last-Modified-Version` observed.
    async fn list_versions(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        since: Version,
    ) -> anyhow::Result<VersionListing>;

    /// Fetches full objects for up to [`FETCH_BATCH_LIMIT`] keys
    ///
    /// # Errors
    /// Fails if more than [`FETCH_BATCH_LIMIT`] keys are passed; callers
    /// must chunk.
    async fn fetch_objects(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        keys: &[ObjectKey],
    ) -> anyhow::Result<Vec<RemoteObject>>;

    /// Creates or updates up to [`FETCH_BATCH_LIMIT`] objects in one batch
    ///
    /// The write is conditional on `if_unmodified_since` (the caller's last
    /// known remote high-water version). Per-object results are keyed by
    /// request index; a failed entry never aborts its siblings.
    async fn write_objects(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        payloads: &[serde_json::Value],
        if_unmodified_since: Version,
    ) -> anyhow::Result<WriteOutcome>;

    /// Deletes objects by key, conditional on `if_unmodified_since`
    async fn delete_objects(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        keys: &[ObjectKey],
        if_unmodified_since: Version,
    ) -> anyhow::Result<()>;

    /// Fetches the remote tombstone feed since `since`
    async fn deletions(
        &self,
        library: LibraryId,
        since: Version,
    ) -> anyhow::Result<RemoteDeletions>;

    /// Verifies the API key and reports its owner and library access
    async fn verify_key(&self) -> anyhow::Result<KeyInfo>;

    /// Step 1 of the attachment upload protocol: request authorization
    ///
    /// `previous_md5` carries the last confirmed remote digest
    /// (`If-Match`); `None` means first upload (`If-None-Match: *`).
    async fn authorize_upload(
        &self,
        library: LibraryId,
        item: &ObjectKey,
        request: &UploadRequest,
        previous_md5: Option<&str>,
    ) -> anyhow::Result<UploadAuthorization>;

    /// Step 2: PUT the framed payload to the presigned endpoint
    async fn upload_payload(&self, ticket: &UploadTicket, bytes: &[u8]) -> anyhow::Result<()>;

    /// Step 3: register the completed upload
    ///
    /// A remote 412 is not an error at this port: it surfaces as
    /// [`RegisterOutcome::ContentChanged`] so the engine can defer the
    /// attachment to the next cycle.
    async fn register_upload(
        &self,
        library: LibraryId,
        item: &ObjectKey,
        upload_key: &str,
        previous_md5: Option<&str>,
    ) -> anyhow::Result<RegisterOutcome>;

    /// Downloads an attachment's binary content
    async fn download_attachment(
        &self,
        library: LibraryId,
        item: &ObjectKey,
    ) -> anyhow::Result<AttachmentContent>;
}
