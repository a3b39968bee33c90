//! Local versioned store port (driven/secondary port)
//!
//! CRUD over the locally persisted mirror of groups, collections, items
//! and tags, keyed by (library, key) or (library, old id). The SQLite
//! adapter in `bibsync-store` is the primary implementation.
//!
//! ## Transactional contract
//!
//! Updates are transactional per object. A batch of N object writes during
//! a sync pass is deliberately NOT wrapped in one cross-object transaction:
//! partial progress on failure is accepted and safe, because the resume
//! point is version-diff-driven, not transaction-driven.

use chrono::{DateTime, Utc};

use crate::domain::group::{Group, Watermarks};
use crate::domain::newtypes::{LibraryId, ObjectKey, OldId, Version};
use crate::domain::object::{ObjectKind, SyncObject, SyncStatus};

/// Port trait for the local persisted mirror
#[async_trait::async_trait]
pub trait VersionedStore: Send + Sync {
    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Loads a group by library id
    async fn group(&self, id: LibraryId) -> anyhow::Result<Option<Group>>;

    /// Loads a group, creating an empty placeholder row on first reference
    async fn ensure_group(&self, id: LibraryId) -> anyhow::Result<Group>;

    /// Persists a group row
    async fn save_group(&self, group: &Group) -> anyhow::Result<()>;

    /// Lists groups that participate in sync cycles (active, not deleted)
    async fn active_groups(&self) -> anyhow::Result<Vec<Group>>;

    /// Applies watermark candidates to a group, monotonically
    ///
    /// Stored watermarks never regress; `None` candidates are left alone.
    async fn commit_watermarks(&self, id: LibraryId, marks: &Watermarks) -> anyhow::Result<()>;

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// Loads an object by (library, kind, key)
    async fn object(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        key: &ObjectKey,
    ) -> anyhow::Result<Option<SyncObject>>;

    /// Loads an object by its caller-supplied idempotency key
    async fn object_by_old_id(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        old_id: &OldId,
    ) -> anyhow::Result<Option<SyncObject>>;

    /// Reads (version, status) for a key, creating a placeholder if unseen
    ///
    /// For a first-seen key an `Incomplete` placeholder row is created
    /// atomically and (version 0, Incomplete) is returned. This makes the
    /// version-diff algorithm safe against first-seen keys without a
    /// separate existence check.
    async fn version_and_status(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        key: &ObjectKey,
    ) -> anyhow::Result<(Version, SyncStatus)>;

    /// Upserts an object row
    ///
    /// An insert whose `old_id` is already bound in this library becomes an
    /// update of the existing row (the OldId uniqueness invariant), never a
    /// duplicate insert.
    async fn save_object(&self, object: &SyncObject) -> anyhow::Result<()>;

    /// Lists objects selected for the upload path (status New or Modified,
    /// not deleted)
    async fn pending_upload(
        &self,
        library: LibraryId,
        kind: ObjectKind,
    ) -> anyhow::Result<Vec<SyncObject>>;

    /// Lists locally tombstoned objects whose deletion has not yet been
    /// confirmed by the remote (deleted, keyed, status Modified)
    async fn pending_local_deletions(
        &self,
        library: LibraryId,
        kind: ObjectKind,
    ) -> anyhow::Result<Vec<SyncObject>>;

    /// Records a confirmed round-trip: Status=Synced, refreshed version
    async fn mark_synced(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        key: &ObjectKey,
        version: Version,
    ) -> anyhow::Result<()>;

    /// Overrides an object's status
    async fn set_status(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        key: &ObjectKey,
        status: SyncStatus,
    ) -> anyhow::Result<()>;

    /// Updates an object's stored attachment checksum
    async fn set_md5(
        &self,
        library: LibraryId,
        key: &ObjectKey,
        md5: &str,
    ) -> anyhow::Result<()>;

    /// Marks an object deleted, cascading to its children first
    ///
    /// Children (an item's dependent notes and attachments) are tombstoned
    /// recursively before the parent, so no child row ever points at a
    /// tombstoned parent while itself alive.
    async fn mark_deleted_cascade(
        &self,
        library: LibraryId,
        key: &ObjectKey,
    ) -> anyhow::Result<()>;

    /// Lists the direct children of an object
    async fn children(
        &self,
        library: LibraryId,
        parent: &ObjectKey,
    ) -> anyhow::Result<Vec<SyncObject>>;

    /// Records that an object was exported to an external consumer
    async fn mark_exported(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        key: &ObjectKey,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}
