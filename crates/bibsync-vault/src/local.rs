//! Local-disk blob storage backend
//!
//! Stores attachments under `<root>/<library id>/<object key>`, one
//! directory per library. Checksums are computed at read time; there is
//! no sidecar metadata.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use bibsync_core::domain::newtypes::{LibraryId, ObjectKey};
use bibsync_core::ports::blob_store::{BlobError, BlobStat, BlobStore};

use crate::md5_hex;

/// Disk-backed implementation of the `BlobStore` port
pub struct LocalVault {
    root: PathBuf,
}

impl LocalVault {
    /// Creates a vault rooted at the given directory
    ///
    /// The root itself is created lazily on the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the vault root
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_path(&self, library: LibraryId) -> PathBuf {
        self.root.join(library.to_string())
    }

    fn blob_path(&self, library: LibraryId, key: &ObjectKey) -> PathBuf {
        self.container_path(library).join(key.as_str())
    }

    /// Maps an I/O error, translating NotFound into the typed signal
    fn map_io(err: std::io::Error, what: String) -> BlobError {
        if err.kind() == std::io::ErrorKind::NotFound {
            BlobError::NotFound(what)
        } else {
            BlobError::Io(err)
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalVault {
    async fn container_exists(&self, library: LibraryId) -> Result<bool, BlobError> {
        Ok(tokio::fs::try_exists(self.container_path(library)).await?)
    }

    async fn create_container(&self, library: LibraryId) -> Result<(), BlobError> {
        tokio::fs::create_dir_all(self.container_path(library)).await?;
        Ok(())
    }

    async fn put(
        &self,
        library: LibraryId,
        key: &ObjectKey,
        bytes: &[u8],
    ) -> Result<String, BlobError> {
        self.create_container(library).await?;

        // Write to a temporary name, then rename into place, so readers
        // never observe a half-written blob.
        let path = self.blob_path(library, key);
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        let etag = md5_hex(bytes);
        debug!(
            library = %library,
            key = %key,
            size = bytes.len(),
            etag = %etag,
            "Stored blob"
        );
        Ok(etag)
    }

    async fn get(&self, library: LibraryId, key: &ObjectKey) -> Result<Vec<u8>, BlobError> {
        let path = self.blob_path(library, key);
        tokio::fs::read(&path)
            .await
            .map_err(|e| Self::map_io(e, key.to_string()))
    }

    async fn stat(&self, library: LibraryId, key: &ObjectKey) -> Result<BlobStat, BlobError> {
        let path = self.blob_path(library, key);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Self::map_io(e, key.to_string()))?;

        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());

        // No sidecar metadata: the etag is recomputed from content.
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Self::map_io(e, key.to_string()))?;

        Ok(BlobStat {
            size: metadata.len(),
            modified,
            etag: Some(md5_hex(&bytes)),
        })
    }

    async fn exists(&self, library: LibraryId, key: &ObjectKey) -> Result<bool, BlobError> {
        Ok(tokio::fs::try_exists(self.blob_path(library, key)).await?)
    }
}
