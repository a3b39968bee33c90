//! Port definitions (trait interfaces for adapters)
//!
//! Three driven ports in the hexagonal architecture:
//! - [`LibraryService`](library_service::LibraryService) — the remote
//!   versioned library API
//! - [`VersionedStore`](object_store::VersionedStore) — the local mirror
//! - [`BlobStore`](blob_store::BlobStore) — attachment binary storage

pub mod blob_store;
pub mod library_service;
pub mod object_store;

pub use blob_store::{BlobError, BlobStat, BlobStore};
pub use library_service::{
    AttachmentContent, KeyInfo, LibraryService, RegisterOutcome, RemoteDeletions, RemoteGroup,
    RemoteObject, UploadAuthorization, UploadRequest, UploadTicket, VersionListing, WriteFailure,
    WriteOutcome, WrittenObject,
};
pub use object_store::VersionedStore;
