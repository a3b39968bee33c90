//! Sync direction and conflict-tiebreak policy
//!
//! `SyncDirection` is pure decision logic: it maps a group's configured
//! direction to the set of allowed actions for a sync cycle. It is consulted
//! before every upload, download and deletion phase; a `None` group is fully
//! skipped, with no remote calls at all.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Direction and tiebreak mode for synchronizing one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// No synchronization at all; the group is intentionally unmanaged
    None,
    /// Upload-only: local changes flow to the remote, nothing is downloaded
    ToCloud,
    /// Download-only: remote changes flow in, local changes never leave
    ToLocal,
    /// Bidirectional, remote wins ties (including remote deletes)
    BothCloud,
    /// Bidirectional, local wins ties
    BothLocal,
    /// Bidirectional, conflicts surfaced and never auto-resolved
    BothManual,
}

impl SyncDirection {
    /// Returns true if local objects may be uploaded under this direction
    #[must_use]
    pub fn can_upload(&self) -> bool {
        matches!(
            self,
            SyncDirection::ToCloud
                | SyncDirection::BothCloud
                | SyncDirection::BothLocal
                | SyncDirection::BothManual
        )
    }

    /// Returns true if remote objects may be downloaded under this direction
    #[must_use]
    pub fn can_download(&self) -> bool {
        matches!(
            self,
            SyncDirection::ToLocal
                | SyncDirection::BothCloud
                | SyncDirection::BothLocal
                | SyncDirection::BothManual
        )
    }

    /// Returns true if a remote tombstone overrides a local uncommitted change
    ///
    /// Under these directions the remote is authoritative for deletes: the
    /// local dirty object is discarded. Everywhere else the local change
    /// survives and the object is resurrected on the next upload.
    #[must_use]
    pub fn remote_wins_deletes(&self) -> bool {
        matches!(self, SyncDirection::ToLocal | SyncDirection::BothCloud)
    }

    /// Returns the direction name used in the local store
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::None => "none",
            SyncDirection::ToCloud => "to_cloud",
            SyncDirection::ToLocal => "to_local",
            SyncDirection::BothCloud => "both_cloud",
            SyncDirection::BothLocal => "both_local",
            SyncDirection::BothManual => "both_manual",
        }
    }
}

impl Default for SyncDirection {
    /// New groups default to the safe bidirectional-local-master mode
    fn default() -> Self {
        SyncDirection::BothLocal
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SyncDirection::None),
            "to_cloud" => Ok(SyncDirection::ToCloud),
            "to_local" => Ok(SyncDirection::ToLocal),
            "both_cloud" => Ok(SyncDirection::BothCloud),
            "both_local" => Ok(SyncDirection::BothLocal),
            "both_manual" => Ok(SyncDirection::BothManual),
            other => Err(DomainError::UnknownDirection(other.to_string())),
        }
    }
}
