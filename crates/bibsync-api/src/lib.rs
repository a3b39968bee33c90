//! Bibsync API - HTTP client for the remote library service
//!
//! Provides the async adapter implementing the `LibraryService` port:
//! - Bearer-authenticated requests with rate-limit compliance
//!   (`Retry-After` re-issue, advisory `Backoff` cooldowns)
//! - Paginated `format=versions` listings
//! - Batched conditional writes with per-object results
//! - The three-step checksum-gated attachment upload protocol
//!
//! ## Modules
//!
//! - [`client`] - Request plumbing, auth, conflict-status mapping
//! - [`governor`] - Shared process-wide rate governor
//! - [`versions`] - Version listings, tombstone feed, group queries
//! - [`write`] - Batch create/update/delete and batch fetch
//! - [`attachment`] - Attachment transfer wire protocol
//! - [`provider`] - `LibraryService` port implementation

pub mod attachment;
pub mod client;
pub mod governor;
pub mod provider;
pub mod versions;
pub mod write;

pub use client::ApiClient;
pub use governor::RateGovernor;
pub use provider::HubLibraryService;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the remote API adapter
///
/// The three precondition/conflict statuses are distinct, non-retried
/// variants: they represent conflicts requiring external resolution, not
/// transient failures. Rate limiting never appears here — throttled calls
/// are re-issued after the mandated sleep and never surface as errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 409: the remote library is locked
    #[error("Library locked (409): {0}")]
    LibraryLocked(String),

    /// HTTP 412: the supplied version precondition no longer matches
    #[error("Version mismatch (412): {0}")]
    VersionMismatch(String),

    /// HTTP 428: a required precondition header was missing
    #[error("Missing precondition (428): {0}")]
    MissingPrecondition(String),

    /// Any other non-success HTTP status
    #[error("HTTP {status} for {path}")]
    Http {
        /// Response status
        status: StatusCode,
        /// Request path
        path: String,
    },

    /// Transport-level failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A header the protocol requires was absent
    #[error("Missing expected header: {0}")]
    MissingHeader(&'static str),

    /// The response body did not match the protocol
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The caller passed more entries than the remote hard limit
    #[error("Batch of {len} exceeds the remote limit of {limit}")]
    BatchTooLarge {
        /// The remote hard limit
        limit: usize,
        /// The attempted batch length
        len: usize,
    },
}

impl ApiError {
    /// Returns true for the precondition/conflict family (409/412/428)
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ApiError::LibraryLocked(_)
                | ApiError::VersionMismatch(_)
                | ApiError::MissingPrecondition(_)
        )
    }
}
