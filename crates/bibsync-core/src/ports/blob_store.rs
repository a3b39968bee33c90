//! Binary attachment storage port (driven/secondary port)
//!
//! The engine requires only a small capability set from a storage backend:
//! exists / create-container / read / write / stat. Backends (local disk,
//! object stores, archives) are external collaborators; `bibsync-vault`
//! ships a local-disk implementation and an in-memory one for tests.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::newtypes::{LibraryId, ObjectKey};

/// Errors surfaced by a blob storage backend
///
/// `NotFound` is a typed signal distinct from other failures: callers
/// branch on it (a missing blob is a normal state, not an error path).
#[derive(Debug, Error)]
pub enum BlobError {
    /// The requested object does not exist in the backend
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// The container for a library does not exist
    #[error("Container not found for library {0}")]
    ContainerNotFound(LibraryId),

    /// An I/O error in the backend
    #[error("Blob I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend-specific failure
    #[error("Blob backend error: {0}")]
    Backend(String),
}

impl BlobError {
    /// Returns true for the typed not-found signal
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BlobError::NotFound(_) | BlobError::ContainerNotFound(_)
        )
    }
}

/// Metadata of a stored blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobStat {
    /// Content size in bytes
    pub size: u64,
    /// Content modification time
    pub modified: DateTime<Utc>,
    /// Content checksum, when the backend tracks one
    pub etag: Option<String>,
}

/// Port trait for binary attachment storage
///
/// Attachments are stored one container per library (bucket-per-group)
/// with the object key as the object name.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns true if the library's container exists
    async fn container_exists(&self, library: LibraryId) -> Result<bool, BlobError>;

    /// Creates the library's container; idempotent
    async fn create_container(&self, library: LibraryId) -> Result<(), BlobError>;

    /// Stores a blob, creating the container if needed
    ///
    /// Returns the backend's checksum for the stored content (the ETag).
    async fn put(
        &self,
        library: LibraryId,
        key: &ObjectKey,
        bytes: &[u8],
    ) -> Result<String, BlobError>;

    /// Reads a blob's full content
    async fn get(&self, library: LibraryId, key: &ObjectKey) -> Result<Vec<u8>, BlobError>;

    /// Returns a blob's metadata
    async fn stat(&self, library: LibraryId, key: &ObjectKey) -> Result<BlobStat, BlobError>;

    /// Returns true if the blob exists
    async fn exists(&self, library: LibraryId, key: &ObjectKey) -> Result<bool, BlobError>;
}
