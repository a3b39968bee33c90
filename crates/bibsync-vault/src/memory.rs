//! In-memory blob storage backend for tests

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use bibsync_core::domain::newtypes::{LibraryId, ObjectKey};
use bibsync_core::ports::blob_store::{BlobError, BlobStat, BlobStore};

use crate::md5_hex;

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Vec<u8>,
    etag: String,
    modified: DateTime<Utc>,
}

/// HashMap-backed implementation of the `BlobStore` port
///
/// Containers must be created explicitly (or implicitly via `put`), like a
/// real object store. Used by engine tests.
#[derive(Debug, Default)]
pub struct MemoryVault {
    containers: Mutex<HashMap<LibraryId, HashMap<String, StoredBlob>>>,
}

impl MemoryVault {
    /// Creates an empty vault
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of blobs stored for a library
    #[must_use]
    pub fn blob_count(&self, library: LibraryId) -> usize {
        self.containers
            .lock()
            .unwrap()
            .get(&library)
            .map_or(0, HashMap::len)
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryVault {
    async fn container_exists(&self, library: LibraryId) -> Result<bool, BlobError> {
        Ok(self.containers.lock().unwrap().contains_key(&library))
    }

    async fn create_container(&self, library: LibraryId) -> Result<(), BlobError> {
        self.containers
            .lock()
            .unwrap()
            .entry(library)
            .or_default();
        Ok(())
    }

    async fn put(
        &self,
        library: LibraryId,
        key: &ObjectKey,
        bytes: &[u8],
    ) -> Result<String, BlobError> {
        let etag = md5_hex(bytes);
        self.containers
            .lock()
            .unwrap()
            .entry(library)
            .or_default()
            .insert(
                key.as_str().to_string(),
                StoredBlob {
                    bytes: bytes.to_vec(),
                    etag: etag.clone(),
                    modified: Utc::now(),
                },
            );
        Ok(etag)
    }

    async fn get(&self, library: LibraryId, key: &ObjectKey) -> Result<Vec<u8>, BlobError> {
        self.containers
            .lock()
            .unwrap()
            .get(&library)
            .and_then(|c| c.get(key.as_str()))
            .map(|b| b.bytes.clone())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn stat(&self, library: LibraryId, key: &ObjectKey) -> Result<BlobStat, BlobError> {
        self.containers
            .lock()
            .unwrap()
            .get(&library)
            .and_then(|c| c.get(key.as_str()))
            .map(|b| BlobStat {
                size: b.bytes.len() as u64,
                modified: b.modified,
                etag: Some(b.etag.clone()),
            })
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn exists(&self, library: LibraryId, key: &ObjectKey) -> Result<bool, BlobError> {
        Ok(self
            .containers
            .lock()
            .unwrap()
            .get(&library)
            .is_some_and(|c| c.contains_key(key.as_str())))
    }
}
