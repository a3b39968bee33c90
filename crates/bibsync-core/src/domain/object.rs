//! SyncObject domain entity
//!
//! A `SyncObject` is the shared shape of the three syncable kinds —
//! collections, items, and tag containers. Each tracks the remote revision
//! number (`Version`) and a local `SyncStatus` that together drive the
//! version-diff reconciliation algorithm.
//!
//! ## Status lifecycle
//!
//! ```text
//!   local create            remote fetch
//!        │                       │
//!        ▼                       ▼
//!     ┌─────┐   upload ok   ┌────────┐   local edit    ┌──────────┐
//!     │ New │ ────────────► │ Synced │ ──────────────► │ Modified │
//!     └─────┘               └────────┘ ◄────────────── └──────────┘
//!                                ▲        upload ok
//!                                │
//!                         ┌────────────┐
//!                         │ Incomplete │  (download-discovered,
//!                         └────────────┘   not yet fetched)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::DomainError;
use super::item_type::ItemType;
use super::newtypes::{LibraryId, ObjectKey, OldId, Version};

// ============================================================================
// ObjectKind
// ============================================================================

/// The three syncable object kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// A collection (folder-like container of items)
    Collection,
    /// A library item (the payload-bearing record, including attachments)
    Item,
    /// A tag container
    Tag,
}

impl ObjectKind {
    /// All kinds, in the order the orchestrator processes them
    pub const ALL: [ObjectKind; 3] = [ObjectKind::Collection, ObjectKind::Item, ObjectKind::Tag];

    /// Returns the kind name used in the local store and API paths
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Collection => "collection",
            ObjectKind::Item => "item",
            ObjectKind::Tag => "tag",
        }
    }

    /// Returns the plural API path segment for this kind
    #[must_use]
    pub fn path_segment(&self) -> &'static str {
        match self {
            ObjectKind::Collection => "collections",
            ObjectKind::Item => "items",
            ObjectKind::Tag => "tags",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collection" => Ok(ObjectKind::Collection),
            "item" => Ok(ObjectKind::Item),
            "tag" => Ok(ObjectKind::Tag),
            other => Err(DomainError::UnknownKind(other.to_string())),
        }
    }
}

// ============================================================================
// SyncStatus
// ============================================================================

/// Local synchronization status of an object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Created locally, never uploaded; carries no remote key yet
    #[default]
    New,
    /// Version equals the last confirmed remote version
    Synced,
    /// Mutated locally since the last confirmed round-trip
    Modified,
    /// Discovered during a download pass but not yet fetched
    Incomplete,
}

impl SyncStatus {
    /// Returns true if the object is eligible for the upload path
    ///
    /// Only New and Modified objects are ever selected for upload.
    #[must_use]
    pub fn is_uploadable(&self) -> bool {
        matches!(self, SyncStatus::New | SyncStatus::Modified)
    }

    /// Returns true if a download pass may update this object in place
    ///
    /// Any other status encountered during download reconciliation is an
    /// unresolved conflict and must abort that object's update.
    #[must_use]
    pub fn is_reconcilable(&self) -> bool {
        matches!(
            self,
            SyncStatus::Synced | SyncStatus::New | SyncStatus::Incomplete
        )
    }

    /// Returns the status name used in the local store
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::New => "new",
            SyncStatus::Synced => "synced",
            SyncStatus::Modified => "modified",
            SyncStatus::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(SyncStatus::New),
            "synced" => Ok(SyncStatus::Synced),
            "modified" => Ok(SyncStatus::Modified),
            "incomplete" => Ok(SyncStatus::Incomplete),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// SyncObject
// ============================================================================

/// A locally persisted collection, item, or tag container
///
/// The `data` payload is opaque pass-through content: the engine never
/// interprets the remote service's field names beyond the few it needs for
/// its own bookkeeping (item type, parent linkage, attachment checksum),
/// which are mirrored into dedicated columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncObject {
    /// Library this object belongs to
    library: LibraryId,
    /// Which of the three syncable kinds this is
    kind: ObjectKind,
    /// Remote key; None until the remote mints one on first upload
    key: Option<ObjectKey>,
    /// Last confirmed remote revision; 0 until the first successful write
    version: Version,
    /// Local synchronization status
    status: SyncStatus,
    /// Tombstone flag; rows are never physically removed
    deleted: bool,
    /// Caller-supplied idempotency key for locally-originated objects
    old_id: Option<OldId>,
    /// Item type tag (items only)
    item_type: Option<ItemType>,
    /// Parent object key (child items: notes, attachments)
    parent_key: Option<ObjectKey>,
    /// Attachment content checksum; the sole "binary changed" signal
    md5: Option<String>,
    /// Opaque payload (the object's field content)
    data: serde_json::Value,
    /// When the object was last modified locally
    modified_at: Option<DateTime<Utc>>,
    /// When the object was last exported to an external consumer
    exported_at: Option<DateTime<Utc>>,
}

impl SyncObject {
    /// Creates a locally-originated object (Status=New, no key yet)
    pub fn new_local(
        library: LibraryId,
        kind: ObjectKind,
        data: serde_json::Value,
        old_id: Option<OldId>,
    ) -> Self {
        Self {
            library,
            kind,
            key: None,
            version: Version::ZERO,
            status: SyncStatus::New,
            deleted: false,
            old_id,
            item_type: None,
            parent_key: None,
            md5: None,
            data,
            modified_at: Some(Utc::now()),
            exported_at: None,
        }
    }

    /// Materializes an object from a remote fetch (Status=Synced)
    pub fn from_remote(
        library: LibraryId,
        kind: ObjectKind,
        key: ObjectKey,
        version: Version,
        data: serde_json::Value,
    ) -> Self {
        let mut obj = Self {
            library,
            kind,
            key: Some(key),
            version,
            status: SyncStatus::Synced,
            deleted: false,
            old_id: None,
            item_type: None,
            parent_key: None,
            md5: None,
            data: serde_json::Value::Null,
            modified_at: Some(Utc::now()),
            exported_at: None,
        };
        obj.set_data(data);
        obj
    }

    /// Creates an Incomplete placeholder for a download-discovered key
    ///
    /// Placeholders make the version-diff algorithm safe against first-seen
    /// keys: they report version 0 without a separate existence check.
    pub fn placeholder(library: LibraryId, kind: ObjectKind, key: ObjectKey) -> Self {
        Self {
            library,
            kind,
            key: Some(key),
            version: Version::ZERO,
            status: SyncStatus::Incomplete,
            deleted: false,
            old_id: None,
            item_type: None,
            parent_key: None,
            md5: None,
            data: serde_json::Value::Null,
            modified_at: None,
            exported_at: None,
        }
    }

    // --- Getters ---

    /// Returns the owning library
    pub fn library(&self) -> LibraryId {
        self.library
    }

    /// Returns the object kind
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Returns the remote key, if one has been assigned
    pub fn key(&self) -> Option<&ObjectKey> {
        self.key.as_ref()
    }

    /// Returns the last confirmed remote version
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the local sync status
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Returns true if this object carries a tombstone
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Returns the idempotency key, if any
    pub fn old_id(&self) -> Option<&OldId> {
        self.old_id.as_ref()
    }

    /// Returns the item type tag (items only)
    pub fn item_type(&self) -> Option<&ItemType> {
        self.item_type.as_ref()
    }

    /// Returns the parent key for child objects
    pub fn parent_key(&self) -> Option<&ObjectKey> {
        self.parent_key.as_ref()
    }

    /// Returns the attachment checksum
    pub fn md5(&self) -> Option<&str> {
        self.md5.as_deref()
    }

    /// Returns the opaque payload
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Returns when the object was last modified locally
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    /// Returns when the object was last exported to an external consumer
    pub fn exported_at(&self) -> Option<DateTime<Utc>> {
        self.exported_at
    }

    /// Returns true if this is an attachment item carrying a checksum
    pub fn is_attachment(&self) -> bool {
        self.kind == ObjectKind::Item
            && matches!(self.item_type, Some(ItemType::Attachment))
            && self.md5.as_deref().is_some_and(|m| !m.is_empty())
    }

    // --- Mutators ---

    /// Replaces the payload, mirroring bookkeeping fields out of it
    ///
    /// `itemType` and `parentItem` are the only payload fields the engine
    /// reads; the rest of the payload stays opaque.
    pub fn set_data(&mut self, data: serde_json::Value) {
        if self.kind == ObjectKind::Item {
            self.item_type = data
                .get("itemType")
                .and_then(|v| v.as_str())
                .map(ItemType::from_name);
            self.parent_key = data
                .get("parentItem")
                .and_then(|v| v.as_str())
                .and_then(|s| ObjectKey::new(s).ok());
            if let Some(md5) = data.get("md5").and_then(|v| v.as_str()) {
                if !md5.is_empty() {
                    self.md5 = Some(md5.to_string());
                }
            }
        }
        self.data = data;
        self.modified_at = Some(Utc::now());
    }

    /// Assigns the remote key returned on creation
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` if a different key is
    /// already assigned; keys are never reused or replaced.
    pub fn assign_key(&mut self, key: ObjectKey) -> Result<(), DomainError> {
        match &self.key {
            Some(existing) if *existing != key => Err(DomainError::ValidationFailed(format!(
                "object already keyed as {existing}, refusing to rekey as {key}"
            ))),
            _ => {
                self.key = Some(key);
                Ok(())
            }
        }
    }

    /// Records a successful round-trip: Status=Synced, refreshed version
    pub fn mark_synced(&mut self, version: Version) {
        self.status = SyncStatus::Synced;
        self.version = version;
    }

    /// Records a local mutation
    pub fn mark_modified(&mut self) {
        self.status = SyncStatus::Modified;
        self.modified_at = Some(Utc::now());
    }

    /// Sets the tombstone flag, keeping the row for audit and idempotence
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.modified_at = Some(Utc::now());
    }

    /// Clears the tombstone flag
    pub fn unmark_deleted(&mut self) {
        self.deleted = false;
    }

    /// Overrides the status directly (store rehydration, deletion policy)
    pub fn set_status(&mut self, status: SyncStatus) {
        self.status = status;
    }

    /// Re-stamps the version without touching the status
    ///
    /// Used by the deletion propagator to let a locally-dirty object pass
    /// the remote's version precondition on its next upload.
    pub fn restamp_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Updates the stored attachment checksum
    pub fn set_md5(&mut self, md5: impl Into<String>) {
        self.md5 = Some(md5.into());
    }

    /// Records an export to an external consumer
    pub fn mark_exported(&mut self, at: DateTime<Utc>) {
        self.exported_at = Some(at);
    }
}
