//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for domain identifiers and values. Each newtype
//! ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Alphabet used by the remote service for object keys.
///
/// Ambiguity-free: no `0`/`O`, no `1`/`I`/`l`. Keys are 8 characters,
/// remote-minted (or remote-returned on creation) and never reused.
pub const KEY_ALPHABET: &str = "23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Length of a remote object key
pub const KEY_LENGTH: usize = 8;

// ============================================================================
// LibraryId
// ============================================================================

/// Identifier of a remote library (group)
///
/// Libraries are the unit of synchronization: each group on the remote
/// service maps to one `LibraryId` locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(i64);

impl LibraryId {
    /// Creates a LibraryId from a raw remote identifier
    ///
    /// # Errors
    /// Returns `DomainError::InvalidLibraryId` if the id is negative.
    pub fn new(id: i64) -> Result<Self, DomainError> {
        if id < 0 {
            return Err(DomainError::InvalidLibraryId(id.to_string()));
        }
        Ok(Self(id))
    }

    /// Returns the raw identifier value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for LibraryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LibraryId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: i64 = s
            .parse()
            .map_err(|_| DomainError::InvalidLibraryId(s.to_string()))?;
        Self::new(raw)
    }
}

// ============================================================================
// Version
// ============================================================================

/// A remote revision number
///
/// Versions are non-negative 64-bit monotonic counters minted by the remote
/// service. A version of 0 always means "never synced".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The "never synced" version
    pub const ZERO: Version = Version(0);

    /// Creates a version from a raw counter value
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    /// Returns the raw counter value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns true if this object has never completed a remote round-trip
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns the larger of two versions
    #[must_use]
    pub fn max(self, other: Version) -> Version {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

// ============================================================================
// ObjectKey
// ============================================================================

/// Remote-assigned opaque identifier of a syncable object
///
/// Keys are 8-character codes drawn from [`KEY_ALPHABET`], globally unique
/// per library. A key is either minted by the remote service or returned by
/// it on creation; locally created objects carry no key until their first
/// successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Creates an ObjectKey, validating length and alphabet
    ///
    /// # Errors
    /// Returns `DomainError::InvalidKey` if the value is not exactly
    /// [`KEY_LENGTH`] characters from [`KEY_ALPHABET`].
    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();
        if key.len() != KEY_LENGTH || !key.chars().all(|c| KEY_ALPHABET.contains(c)) {
            return Err(DomainError::InvalidKey(key));
        }
        Ok(Self(key))
    }

    /// Returns the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// OldId
// ============================================================================

/// Caller-supplied idempotency key
///
/// Correlates a locally-originated object to its eventual remote
/// [`ObjectKey`]. The mapping is unique per library: attempting to create a
/// second object with an OldId already bound converts the operation into an
/// update of the existing object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OldId(String);

impl OldId {
    /// Maximum accepted length for an idempotency key
    const MAX_LENGTH: usize = 255;

    /// Creates an OldId from a caller-supplied correlation key
    ///
    /// # Errors
    /// Returns `DomainError::InvalidOldId` if the value is empty or longer
    /// than 255 characters.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() || id.len() > Self::MAX_LENGTH {
            return Err(DomainError::InvalidOldId(id));
        }
        Ok(Self(id))
    }

    /// Returns the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OldId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OldId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// CycleId
// ============================================================================

/// Identifier for one orchestrator sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(Uuid);

impl CycleId {
    /// Create a new random CycleId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a CycleId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CycleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CycleId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid CycleId: {e}")))
    }
}
