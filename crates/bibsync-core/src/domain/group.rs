//! Group domain entity and watermark bookkeeping
//!
//! A `Group` mirrors one remote library. Remote sync is incremental per
//! object kind, so a group carries three independent high-water marks on
//! top of the whole-library version. Groups are created on first reference
//! as empty placeholders and never physically removed: deletion is a flag,
//! preserving history and idempotence for external consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::direction::SyncDirection;
use super::newtypes::{LibraryId, Version};
use super::object::ObjectKind;

// ============================================================================
// Watermarks
// ============================================================================

/// Per-kind watermark candidates observed during a sync cycle
///
/// Each field holds the maximum `Last-Modified-Version` seen by the phases
/// that actually ran; `None` means the corresponding phase did not complete
/// and its watermark must not advance. The orchestrator commits these once,
/// at the end of a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermarks {
    /// Candidate for the whole-library version
    pub library: Option<Version>,
    /// Candidate for the item high-water mark
    pub items: Option<Version>,
    /// Candidate for the collection high-water mark
    pub collections: Option<Version>,
    /// Candidate for the tag high-water mark
    pub tags: Option<Version>,
}

impl Watermarks {
    /// Records an observed version for one object kind
    pub fn observe(&mut self, kind: ObjectKind, version: Version) {
        let slot = match kind {
            ObjectKind::Item => &mut self.items,
            ObjectKind::Collection => &mut self.collections,
            ObjectKind::Tag => &mut self.tags,
        };
        *slot = Some(slot.map_or(version, |v| v.max(version)));
        self.library = Some(self.library.map_or(version, |v| v.max(version)));
    }

    /// Records an observed whole-library version (deletion pass)
    pub fn observe_library(&mut self, version: Version) {
        self.library = Some(self.library.map_or(version, |v| v.max(version)));
    }

    /// Returns true if no phase recorded anything
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.library.is_none()
            && self.items.is_none()
            && self.collections.is_none()
            && self.tags.is_none()
    }
}

// ============================================================================
// Group
// ============================================================================

/// Locally persisted state of one remote library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Remote library identifier
    id: LibraryId,
    /// Whole-library watermark
    version: Version,
    /// Item high-water mark
    item_version: Version,
    /// Collection high-water mark
    collection_version: Version,
    /// Tag high-water mark
    tag_version: Version,
    /// Whether this group participates in sync cycles
    active: bool,
    /// Direction and tiebreak mode
    direction: SyncDirection,
    /// Tombstone flag; the row is kept for history and idempotence
    deleted: bool,
    /// Opaque group metadata payload
    data: serde_json::Value,
    /// When the group row was last updated
    updated_at: Option<DateTime<Utc>>,
}

impl Group {
    /// Creates an empty placeholder group on first reference
    ///
    /// The direction defaults to the safe bidirectional-local-master mode.
    #[must_use]
    pub fn placeholder(id: LibraryId) -> Self {
        Self {
            id,
            version: Version::ZERO,
            item_version: Version::ZERO,
            collection_version: Version::ZERO,
            tag_version: Version::ZERO,
            active: true,
            direction: SyncDirection::default(),
            deleted: false,
            data: serde_json::Value::Null,
            updated_at: Some(Utc::now()),
        }
    }

    /// Rehydrates a group from stored state
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_parts(
        id: LibraryId,
        version: Version,
        item_version: Version,
        collection_version: Version,
        tag_version: Version,
        active: bool,
        direction: SyncDirection,
        deleted: bool,
        data: serde_json::Value,
        updated_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            version,
            item_version,
            collection_version,
            tag_version,
            active,
            direction,
            deleted,
            data,
            updated_at,
        }
    }

    // --- Getters ---

    /// Returns the library identifier
    pub fn id(&self) -> LibraryId {
        self.id
    }

    /// Returns the whole-library watermark
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the watermark for one object kind
    pub fn watermark(&self, kind: ObjectKind) -> Version {
        match kind {
            ObjectKind::Item => self.item_version,
            ObjectKind::Collection => self.collection_version,
            ObjectKind::Tag => self.tag_version,
        }
    }

    /// Returns whether the group participates in sync cycles
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the configured sync direction
    pub fn direction(&self) -> SyncDirection {
        self.direction
    }

    /// Returns the tombstone flag
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Returns the opaque metadata payload
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Returns when the group row was last updated
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    // --- Mutators ---

    /// Sets the sync direction
    pub fn set_direction(&mut self, direction: SyncDirection) {
        self.direction = direction;
        self.touch();
    }

    /// Activates or deactivates the group
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.touch();
    }

    /// Marks the group deleted (flag only; the row survives)
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.touch();
    }

    /// Replaces the metadata payload after a remote group fetch
    pub fn update_data(&mut self, version: Version, data: serde_json::Value) {
        self.version = self.version.max(version);
        self.data = data;
        self.touch();
    }

    /// Applies watermark candidates collected during a cycle
    ///
    /// Watermarks are monotonic: a candidate below the stored value never
    /// regresses it, and `None` candidates leave the stored value alone.
    pub fn apply_watermarks(&mut self, marks: &Watermarks) {
        if let Some(v) = marks.items {
            self.item_version = self.item_version.max(v);
        }
        if let Some(v) = marks.collections {
            self.collection_version = self.collection_version.max(v);
        }
        if let Some(v) = marks.tags {
            self.tag_version = self.tag_version.max(v);
        }
        if let Some(v) = marks.library {
            self.version = self.version.max(v);
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}
