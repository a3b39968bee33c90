//! SQLite implementation of the VersionedStore port
//!
//! This module provides the concrete SQLite-based implementation of the
//! store port defined in bibsync-core. It handles all domain type
//! serialization/deserialization and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type    | SQL Type | Strategy                                  |
//! |----------------|----------|-------------------------------------------|
//! | LibraryId      | INTEGER  | `as_i64()` / `LibraryId::new()`           |
//! | Version        | INTEGER  | `as_u64() as i64` / `Version::new()`      |
//! | ObjectKey      | TEXT     | `as_str()` / `ObjectKey::new()`           |
//! | OldId          | TEXT     | `as_str()` / `OldId::new()`               |
//! | ObjectKind     | TEXT     | `as_str()` / `FromStr`                    |
//! | SyncStatus     | TEXT     | `as_str()` / `FromStr`                    |
//! | SyncDirection  | TEXT     | `as_str()` / `FromStr`                    |
//! | ItemType       | TEXT     | `name()` / `ItemType::from_name()`        |
//! | DateTime<Utc>  | TEXT     | RFC 3339 via `to_rfc3339()`               |
//! | payload `data` | TEXT     | serde_json                                |
//!
//! ## Transactional contract
//!
//! Each object upsert runs in its own transaction. Batches are not wrapped
//! in a cross-object transaction: partial progress is safe because the
//! engine's resume point is version-diff-driven.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use bibsync_core::domain::{
    Group, ItemType, LibraryId, ObjectKey, ObjectKind, OldId, SyncDirection, SyncObject,
    SyncStatus, Version, Watermarks,
};
use bibsync_core::ports::VersionedStore;

use crate::StoreError;

/// SQLite-based implementation of the versioned store port
///
/// Provides persistent storage for groups and syncable objects. All
/// operations go through a connection pool for concurrency; per-row
/// read-modify-write sequences take a transaction.
pub struct SqliteVersionedStore {
    pool: SqlitePool,
}

impl SqliteVersionedStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Parse a DateTime<Utc> from an RFC 3339 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::SerializationError(format!("Failed to parse datetime '{s}': {e}"))
        })
}

/// Parse an optional DateTime<Utc> from an optional string
fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

/// Format an optional DateTime<Utc> for storage
fn datetime_to_column(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(|d| d.to_rfc3339())
}

/// Convert a stored version column (i64) into the domain Version
fn version_from_column(v: i64) -> Version {
    Version::new(u64::try_from(v).unwrap_or(0))
}

/// Convert a domain Version into its column representation
fn version_to_column(v: Version) -> i64 {
    i64::try_from(v.as_u64()).unwrap_or(i64::MAX)
}

// ============================================================================
// Row mapping functions
// ============================================================================

/// Reconstruct a Group from a database row
fn group_from_row(row: &SqliteRow) -> Result<Group, StoreError> {
    let library_id: i64 = row.get("library_id");
    let version: i64 = row.get("version");
    let item_version: i64 = row.get("item_version");
    let collection_version: i64 = row.get("collection_version");
    let tag_version: i64 = row.get("tag_version");
    let active: i64 = row.get("active");
    let direction_str: String = row.get("direction");
    let deleted: i64 = row.get("deleted");
    let data_str: String = row.get("data");
    let updated_at_str: Option<String> = row.get("updated_at");

    let id = LibraryId::new(library_id).map_err(|e| {
        StoreError::SerializationError(format!("Invalid library id {library_id}: {e}"))
    })?;
    let direction = SyncDirection::from_str(&direction_str).map_err(|e| {
        StoreError::SerializationError(format!("Invalid direction '{direction_str}': {e}"))
    })?;
    let data: serde_json::Value = serde_json::from_str(&data_str)
        .map_err(|e| StoreError::SerializationError(format!("Invalid group data JSON: {e}")))?;
    let updated_at = parse_optional_datetime(updated_at_str)?;

    Ok(Group::from_parts(
        id,
        version_from_column(version),
        version_from_column(item_version),
        version_from_column(collection_version),
        version_from_column(tag_version),
        active != 0,
        direction,
        deleted != 0,
        data,
        updated_at,
    ))
}

/// Reconstruct a SyncObject from a database row
///
/// Uses serde JSON deserialization to reconstruct the object since the
/// struct has private fields that can only be set through constructors or
/// deserialization.
fn object_from_row(row: &SqliteRow) -> Result<SyncObject, StoreError> {
    let library_id: i64 = row.get("library_id");
    let kind_str: String = row.get("kind");
    let key_str: Option<String> = row.get("key");
    let version: i64 = row.get("version");
    let status_str: String = row.get("status");
    let deleted: i64 = row.get("deleted");
    let old_id_str: Option<String> = row.get("old_id");
    let item_type_str: Option<String> = row.get("item_type");
    let parent_key_str: Option<String> = row.get("parent_key");
    let md5_str: Option<String> = row.get("md5");
    let data_str: String = row.get("data");
    let modified_at_str: Option<String> = row.get("modified_at");
    let exported_at_str: Option<String> = row.get("exported_at");

    let data: serde_json::Value = serde_json::from_str(&data_str)
        .map_err(|e| StoreError::SerializationError(format!("Invalid object data JSON: {e}")))?;

    let modified_at = parse_optional_datetime(modified_at_str)?
        .map(|d| serde_json::Value::String(d.to_rfc3339()))
        .unwrap_or(serde_json::Value::Null);
    let exported_at = parse_optional_datetime(exported_at_str)?
        .map(|d| serde_json::Value::String(d.to_rfc3339()))
        .unwrap_or(serde_json::Value::Null);

    let object_json = serde_json::json!({
        "library": library_id,
        "kind": kind_str,
        "key": key_str,
        "version": u64::try_from(version).unwrap_or(0),
        "status": status_str,
        "deleted": deleted != 0,
        "old_id": old_id_str,
        "item_type": item_type_str,
        "parent_key": parent_key_str,
        "md5": md5_str,
        "data": data,
        "modified_at": modified_at,
        "exported_at": exported_at,
    });

    serde_json::from_value(object_json).map_err(|e| {
        StoreError::SerializationError(format!("Failed to reconstruct SyncObject from row: {e}"))
    })
}

// ============================================================================
// VersionedStore implementation
// ============================================================================

#[async_trait::async_trait]
impl VersionedStore for SqliteVersionedStore {
    async fn group(&self, id: LibraryId) -> anyhow::Result<Option<Group>> {
        let row = sqlx::query("SELECT * FROM groups WHERE library_id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        row.map(|r| group_from_row(&r)).transpose().map_err(Into::into)
    }

    async fn ensure_group(&self, id: LibraryId) -> anyhow::Result<Group> {
        sqlx::query(
            "INSERT OR IGNORE INTO groups (library_id, direction, data, updated_at)
             VALUES (?, ?, 'null', ?)",
        )
        .bind(id.as_i64())
        .bind(SyncDirection::default().as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        self.group(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("group {id} missing after placeholder insert"))
    }

    async fn save_group(&self, group: &Group) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO groups (library_id, version, item_version, collection_version,
                                 tag_version, active, direction, deleted, data, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(library_id) DO UPDATE SET
                 version = excluded.version,
                 item_version = excluded.item_version,
                 collection_version = excluded.collection_version,
                 tag_version = excluded.tag_version,
                 active = excluded.active,
                 direction = excluded.direction,
                 deleted = excluded.deleted,
                 data = excluded.data,
                 updated_at = excluded.updated_at",
        )
        .bind(group.id().as_i64())
        .bind(version_to_column(group.version()))
        .bind(version_to_column(group.watermark(ObjectKind::Item)))
        .bind(version_to_column(group.watermark(ObjectKind::Collection)))
        .bind(version_to_column(group.watermark(ObjectKind::Tag)))
        .bind(i64::from(group.is_active()))
        .bind(group.direction().as_str())
        .bind(i64::from(group.is_deleted()))
        .bind(serde_json::to_string(group.data()).map_err(|e| {
            StoreError::SerializationError(format!("Failed to serialize group data: {e}"))
        })?)
        .bind(datetime_to_column(group.updated_at()))
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(())
    }

    async fn active_groups(&self) -> anyhow::Result<Vec<Group>> {
        let rows = sqlx::query(
            "SELECT * FROM groups WHERE active = 1 AND deleted = 0 ORDER BY library_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.iter()
            .map(|r| group_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn commit_watermarks(&self, id: LibraryId, marks: &Watermarks) -> anyhow::Result<()> {
        // MAX() keeps stored watermarks monotonic; COALESCE leaves a
        // watermark untouched when its phase did not run.
        sqlx::query(
            "UPDATE groups SET
                 item_version = MAX(item_version, COALESCE(?, item_version)),
                 collection_version = MAX(collection_version, COALESCE(?, collection_version)),
                 tag_version = MAX(tag_version, COALESCE(?, tag_version)),
                 version = MAX(version, COALESCE(?, version)),
                 updated_at = ?
             WHERE library_id = ?",
        )
        .bind(marks.items.map(version_to_column))
        .bind(marks.collections.map(version_to_column))
        .bind(marks.tags.map(version_to_column))
        .bind(marks.library.map(version_to_column))
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        debug!(library = %id, ?marks, "Committed watermarks");
        Ok(())
    }

    async fn object(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        key: &ObjectKey,
    ) -> anyhow::Result<Option<SyncObject>> {
        let row = sqlx::query(
            "SELECT * FROM objects WHERE library_id = ? AND kind = ? AND key = ?",
        )
        .bind(library.as_i64())
        .bind(kind.as_str())
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(|r| object_from_row(&r)).transpose().map_err(Into::into)
    }

    async fn object_by_old_id(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        old_id: &OldId,
    ) -> anyhow::Result<Option<SyncObject>> {
        let row = sqlx::query(
            "SELECT * FROM objects WHERE library_id = ? AND kind = ? AND old_id = ?",
        )
        .bind(library.as_i64())
        .bind(kind.as_str())
        .bind(old_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(|r| object_from_row(&r)).transpose().map_err(Into::into)
    }

    async fn version_and_status(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        key: &ObjectKey,
    ) -> anyhow::Result<(Version, SyncStatus)> {
        // INSERT OR IGNORE makes the placeholder creation atomic: a
        // first-seen key lands as (version 0, Incomplete) and concurrent
        // callers race harmlessly.
        sqlx::query(
            "INSERT OR IGNORE INTO objects (library_id, kind, key, version, status, data)
             VALUES (?, ?, ?, 0, ?, 'null')",
        )
        .bind(library.as_i64())
        .bind(kind.as_str())
        .bind(key.as_str())
        .bind(SyncStatus::Incomplete.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let row = sqlx::query(
            "SELECT version, status FROM objects WHERE library_id = ? AND kind = ? AND key = ?",
        )
        .bind(library.as_i64())
        .bind(kind.as_str())
        .bind(key.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let version: i64 = row.get("version");
        let status_str: String = row.get("status");
        let status = SyncStatus::from_str(&status_str).map_err(|e| {
            StoreError::SerializationError(format!("Invalid status '{status_str}': {e}"))
        })?;

        Ok((version_from_column(version), status))
    }

    async fn save_object(&self, object: &SyncObject) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        // Resolve the target row: by key first, then by old id. An insert
        // whose old id is already bound becomes an update of that row.
        let mut row_id: Option<i64> = None;
        if let Some(key) = object.key() {
            row_id = sqlx::query_scalar::<_, i64>(
                "SELECT id FROM objects WHERE library_id = ? AND kind = ? AND key = ?",
            )
            .bind(object.library().as_i64())
            .bind(object.kind().as_str())
            .bind(key.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        }
        if row_id.is_none() {
            if let Some(old_id) = object.old_id() {
                row_id = sqlx::query_scalar::<_, i64>(
                    "SELECT id FROM objects WHERE library_id = ? AND kind = ? AND old_id = ?",
                )
                .bind(object.library().as_i64())
                .bind(object.kind().as_str())
                .bind(old_id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(StoreError::from)?;
            }
        }

        let data = serde_json::to_string(object.data()).map_err(|e| {
            StoreError::SerializationError(format!("Failed to serialize object data: {e}"))
        })?;

        match row_id {
            Some(id) => {
                sqlx::query(
                    "UPDATE objects SET
                         key = ?, version = ?, status = ?, deleted = ?, old_id = ?,
                         item_type = ?, parent_key = ?, md5 = ?, data = ?,
                         modified_at = ?, exported_at = ?
                     WHERE id = ?",
                )
                .bind(object.key().map(ObjectKey::as_str))
                .bind(version_to_column(object.version()))
                .bind(object.status().as_str())
                .bind(i64::from(object.is_deleted()))
                .bind(object.old_id().map(OldId::as_str))
                .bind(object.item_type().map(ItemType::name))
                .bind(object.parent_key().map(ObjectKey::as_str))
                .bind(object.md5())
                .bind(data)
                .bind(datetime_to_column(object.modified_at()))
                .bind(datetime_to_column(object.exported_at()))
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from)?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO objects (library_id, kind, key, version, status, deleted,
                                          old_id, item_type, parent_key, md5, data,
                                          modified_at, exported_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(object.library().as_i64())
                .bind(object.kind().as_str())
                .bind(object.key().map(ObjectKey::as_str))
                .bind(version_to_column(object.version()))
                .bind(object.status().as_str())
                .bind(i64::from(object.is_deleted()))
                .bind(object.old_id().map(OldId::as_str))
                .bind(object.item_type().map(ItemType::name))
                .bind(object.parent_key().map(ObjectKey::as_str))
                .bind(object.md5())
                .bind(data)
                .bind(datetime_to_column(object.modified_at()))
                .bind(datetime_to_column(object.exported_at()))
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from)?;
            }
        }

        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn pending_upload(
        &self,
        library: LibraryId,
        kind: ObjectKind,
    ) -> anyhow::Result<Vec<SyncObject>> {
        let rows = sqlx::query(
            "SELECT * FROM objects
             WHERE library_id = ? AND kind = ? AND deleted = 0
               AND status IN (?, ?)
             ORDER BY id",
        )
        .bind(library.as_i64())
        .bind(kind.as_str())
        .bind(SyncStatus::New.as_str())
        .bind(SyncStatus::Modified.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.iter()
            .map(|r| object_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn pending_local_deletions(
        &self,
        library: LibraryId,
        kind: ObjectKind,
    ) -> anyhow::Result<Vec<SyncObject>> {
        let rows = sqlx::query(
            "SELECT * FROM objects
             WHERE library_id = ? AND kind = ? AND deleted = 1
               AND key IS NOT NULL AND status = ?
             ORDER BY id",
        )
        .bind(library.as_i64())
        .bind(kind.as_str())
        .bind(SyncStatus::Modified.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.iter()
            .map(|r| object_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn mark_synced(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        key: &ObjectKey,
        version: Version,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE objects SET status = ?, version = ?
             WHERE library_id = ? AND kind = ? AND key = ?",
        )
        .bind(SyncStatus::Synced.as_str())
        .bind(version_to_column(version))
        .bind(library.as_i64())
        .bind(kind.as_str())
        .bind(key.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn set_status(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        key: &ObjectKey,
        status: SyncStatus,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE objects SET status = ? WHERE library_id = ? AND kind = ? AND key = ?",
        )
        .bind(status.as_str())
        .bind(library.as_i64())
        .bind(kind.as_str())
        .bind(key.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn set_md5(
        &self,
        library: LibraryId,
        key: &ObjectKey,
        md5: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE objects SET md5 = ? WHERE library_id = ? AND kind = ? AND key = ?",
        )
        .bind(md5)
        .bind(library.as_i64())
        .bind(ObjectKind::Item.as_str())
        .bind(key.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    async fn mark_deleted_cascade(
        &self,
        library: LibraryId,
        key: &ObjectKey,
    ) -> anyhow::Result<()> {
        // Walk the child graph breadth-first, then tombstone children
        // before the parent, so no live child row ever points at a
        // tombstoned parent. Rows become dirty tombstones (Modified)
        // awaiting remote propagation on the next upload phase.
        let mut ordered: Vec<String> = Vec::new();
        let mut frontier = vec![key.as_str().to_string()];

        while let Some(current) = frontier.pop() {
            let children: Vec<String> = sqlx::query_scalar(
                "SELECT key FROM objects
                 WHERE library_id = ? AND parent_key = ? AND key IS NOT NULL AND deleted = 0",
            )
            .bind(library.as_i64())
            .bind(&current)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;

            frontier.extend(children.iter().cloned());
            ordered.push(current);
        }

        for target in ordered.iter().rev() {
            sqlx::query(
                "UPDATE objects SET deleted = 1, status = ?, modified_at = ?
                 WHERE library_id = ? AND key = ?",
            )
            .bind(SyncStatus::Modified.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(library.as_i64())
            .bind(target)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        }

        debug!(library = %library, key = %key, cascade = ordered.len(), "Tombstoned with cascade");
        Ok(())
    }

    async fn children(
        &self,
        library: LibraryId,
        parent: &ObjectKey,
    ) -> anyhow::Result<Vec<SyncObject>> {
        let rows = sqlx::query(
            "SELECT * FROM objects WHERE library_id = ? AND parent_key = ? ORDER BY id",
        )
        .bind(library.as_i64())
        .bind(parent.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.iter()
            .map(|r| object_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn mark_exported(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        key: &ObjectKey,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE objects SET exported_at = ? WHERE library_id = ? AND kind = ? AND key = ?",
        )
        .bind(at.to_rfc3339())
        .bind(library.as_i64())
        .bind(kind.as_str())
        .bind(key.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }
}
