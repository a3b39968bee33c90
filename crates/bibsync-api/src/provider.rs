//! HubLibraryService - LibraryService implementation for the remote API
//!
//! Wraps the [`ApiClient`] and delegates to the versions, write, and
//! attachment modules to fulfil the `LibraryService` port contract.
//!
//! ## Design Notes
//!
//! - Port methods return `anyhow::Result`; the adapter's typed
//!   [`ApiError`](crate::ApiError) is preserved as the error source so
//!   callers can downcast when they need status-level detail.
//! - Rate-limit compliance is entirely inside [`ApiClient::execute`];
//!   nothing here retries.

use std::collections::HashMap;

use anyhow::Context;

use bibsync_core::domain::newtypes::{LibraryId, ObjectKey, Version};
use bibsync_core::domain::object::ObjectKind;
use bibsync_core::ports::library_service::{
    AttachmentContent, KeyInfo, LibraryService, RegisterOutcome, RemoteDeletions, RemoteGroup,
    RemoteObject, UploadAuthorization, UploadRequest, UploadTicket, VersionListing, WriteOutcome,
};

use crate::client::ApiClient;
use crate::versions::DEFAULT_PAGE_SIZE;
use crate::{attachment, versions, write, ApiError};

/// `LibraryService` port implementation backed by the hosted library API
pub struct HubLibraryService {
    client: ApiClient,
    page_size: u32,
}

impl HubLibraryService {
    /// Creates a service wrapper around an authenticated client
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides the version-listing page size (capped by the remote)
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
        self
    }

    /// Returns the wrapped client
    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait::async_trait]
impl LibraryService for HubLibraryService {
    async fn group_versions(&self) -> anyhow::Result<HashMap<LibraryId, Version>> {
        versions::group_versions(&self.client)
            .await
            .context("Failed to list group versions")
    }

    async fn group(&self, library: LibraryId) -> anyhow::Result<RemoteGroup> {
        versions::group(&self.client, library)
            .await
            .with_context(|| format!("Failed to fetch group {library}"))
    }

    async fn list_versions(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        since: Version,
    ) -> anyhow::Result<VersionListing> {
        versions::list_object_versions(&self.client, library, kind, since, self.page_size)
            .await
            .with_context(|| format!("Failed to list {kind} versions for group {library}"))
    }

    async fn fetch_objects(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        keys: &[ObjectKey],
    ) -> anyhow::Result<Vec<RemoteObject>> {
        write::fetch_objects(&self.client, library, kind, keys)
            .await
            .with_context(|| format!("Failed to fetch {kind} batch for group {library}"))
    }

    async fn write_objects(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        payloads: &[serde_json::Value],
        if_unmodified_since: Version,
    ) -> anyhow::Result<WriteOutcome> {
        write::write_objects(&self.client, library, kind, payloads, if_unmodified_since)
            .await
            .with_context(|| format!("Failed to write {kind} batch for group {library}"))
    }

    async fn delete_objects(
        &self,
        library: LibraryId,
        kind: ObjectKind,
        keys: &[ObjectKey],
        if_unmodified_since: Version,
    ) -> anyhow::Result<()> {
        write::delete_objects(&self.client, library, kind, keys, if_unmodified_since)
            .await
            .with_context(|| format!("Failed to delete {kind} batch for group {library}"))
    }

    async fn deletions(
        &self,
        library: LibraryId,
        since: Version,
    ) -> anyhow::Result<RemoteDeletions> {
        versions::deletions(&self.client, library, since)
            .await
            .with_context(|| format!("Failed to fetch deletions for group {library}"))
    }

    async fn verify_key(&self) -> anyhow::Result<KeyInfo> {
        versions::verify_key(&self.client)
            .await
            .context("Failed to verify API key")
    }

    async fn authorize_upload(
        &self,
        library: LibraryId,
        item: &ObjectKey,
        request: &UploadRequest,
        previous_md5: Option<&str>,
    ) -> anyhow::Result<UploadAuthorization> {
        attachment::authorize_upload(&self.client, library, item, request, previous_md5)
            .await
            .with_context(|| format!("Failed to authorize upload for item {item}"))
    }

    async fn upload_payload(&self, ticket: &UploadTicket, bytes: &[u8]) -> anyhow::Result<()> {
        attachment::upload_payload(&self.client, ticket, bytes)
            .await
            .context("Failed to upload attachment payload")
    }

    async fn register_upload(
        &self,
        library: LibraryId,
        item: &ObjectKey,
        upload_key: &str,
        previous_md5: Option<&str>,
    ) -> anyhow::Result<RegisterOutcome> {
        match attachment::register_upload(&self.client, library, item, upload_key, previous_md5)
            .await
        {
            Ok(()) => Ok(RegisterOutcome::Registered),
            Err(ApiError::VersionMismatch(_)) => Ok(RegisterOutcome::ContentChanged),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to register upload for item {item}"))
            }
        }
    }

    async fn download_attachment(
        &self,
        library: LibraryId,
        item: &ObjectKey,
    ) -> anyhow::Result<AttachmentContent> {
        attachment::download_attachment(&self.client, library, item)
            .await
            .with_context(|| format!("Failed to download attachment for item {item}"))
    }
}
