//! HTTP client for the remote library service
//!
//! Provides a typed client wrapper enforcing bearer authentication,
//! rate-limit compliance and the service's optimistic-concurrency
//! protocol. All request plumbing funnels through [`ApiClient::execute`]:
//! the governor gate, header observation, `Retry-After` re-issue loop and
//! conflict-status mapping live in exactly one place.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bibsync_api::client::ApiClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = ApiClient::new("api-key-here", 12345);
//! let info = bibsync_api::versions::verify_key(&client).await?;
//! println!("key belongs to {}", info.username);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, warn};

use bibsync_core::domain::newtypes::Version;

use crate::governor::{parse_pause, RateGovernor, RETRY_AFTER};
use crate::ApiError;

/// Base URL of the hosted library service
const API_BASE_URL: &str = "https://api.bibhub.org";

/// Pause applied to a 429 response that carries no Retry-After header
const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(30);

/// Header carrying the version stamped on the response
pub const LAST_MODIFIED_VERSION: &str = "Last-Modified-Version";

/// Header carrying the total result count of a paginated listing
pub const TOTAL_RESULTS: &str = "Total-Results";

/// Header carrying the caller's version precondition on writes
pub const IF_UNMODIFIED_SINCE_VERSION: &str = "If-Unmodified-Since-Version";

/// HTTP client for the remote library service
///
/// Wraps `reqwest::Client` with bearer authentication, base-URL
/// construction, and a shared [`RateGovernor`] that serializes
/// server-mandated pauses process-wide.
pub struct ApiClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
    /// Bearer token for the remote API
    api_key: String,
    /// Remote user id owning the API key
    user_id: i64,
    /// Shared account-wide rate governor
    governor: Arc<RateGovernor>,
}

impl ApiClient {
    /// Creates a new client against the hosted service
    pub fn new(api_key: impl Into<String>, user_id: i64) -> Self {
        Self::with_base_url(api_key, user_id, API_BASE_URL)
    }

    /// Creates a client from the application configuration
    pub fn from_config(config: &bibsync_core::config::ApiConfig) -> Self {
        Self::with_base_url(config.api_key.clone(), config.user_id, config.base_url.clone())
    }

    /// Creates a new client with a custom base URL (useful for testing)
    pub fn with_base_url(
        api_key: impl Into<String>,
        user_id: i64,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            user_id,
            governor: Arc::new(RateGovernor::new()),
        }
    }

    /// Replaces the governor with a shared instance
    ///
    /// The Backoff/Retry-After headers describe the account-wide budget;
    /// when several clients share one API key they must share one governor.
    #[must_use]
    pub fn with_governor(mut self, governor: Arc<RateGovernor>) -> Self {
        self.governor = governor;
        self
    }

    /// Returns the shared rate governor
    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    /// Returns the remote user id owning the API key
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns a reference to the underlying reqwest client
    ///
    /// Used by the attachment module for requests against presigned URLs
    /// on foreign hosts (no auth header, no governor).
    pub(crate) fn http_client(&self) -> &Client {
        &self.client
    }

    /// Creates an authenticated request builder for the given method/path
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, &url)
            .bearer_auth(&self.api_key)
    }

    /// Executes a request with rate-limit compliance and conflict mapping
    ///
    /// The request lifecycle:
    /// 1. Block until the shared governor's cooldown has expired — no
    ///    request is issued while a mandated sleep is outstanding.
    /// 2. Send, then feed the response headers to the governor (an
    ///    advisory `Backoff` on any response arms the next cooldown).
    /// 3. On 429 (or 503 carrying `Retry-After`): sleep the mandated
    ///    duration and re-issue. The loop runs as long as the service
    ///    keeps mandating pauses; throttling is never surfaced as failure.
    /// 4. Map 409/412/428 to their distinct conflict errors; these are
    ///    never retried here.
    ///
    /// # Errors
    /// Returns `ApiError` for transport failures, conflict statuses and
    /// other non-success responses.
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let mut attempt: u32 = 0;
        loop {
            self.governor.await_ready().await;

            let builder = request
                .try_clone()
                .ok_or_else(|| ApiError::Malformed("request body is not replayable".into()))?;

            let response = builder.send().await?;
            self.governor.observe(response.headers());

            let status = response.status();
            let path = response.url().path().to_string();

            if status == StatusCode::TOO_MANY_REQUESTS
                || (status == StatusCode::SERVICE_UNAVAILABLE
                    && response.headers().contains_key(RETRY_AFTER))
            {
                let pause = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(parse_pause)
                    .unwrap_or(DEFAULT_RETRY_PAUSE);

                attempt += 1;
                warn!(
                    %path,
                    attempt,
                    pause_ms = pause.as_millis() as u64,
                    "Rate limited, re-issuing after mandated pause"
                );
                self.governor.penalize(pause);
                continue;
            }

            if attempt > 0 {
                info!(%path, attempt, "Request succeeded after rate-limit pauses");
            }

            return match status {
                StatusCode::CONFLICT => Err(ApiError::LibraryLocked(path)),
                StatusCode::PRECONDITION_FAILED => Err(ApiError::VersionMismatch(path)),
                StatusCode::PRECONDITION_REQUIRED => Err(ApiError::MissingPrecondition(path)),
                s if s.is_success() => Ok(response),
                s => {
                    debug!(%path, status = %s, "Request returned error status");
                    Err(ApiError::Http { status: s, path })
                }
            };
        }
    }

    /// Convenience wrapper: execute a plain GET against a path
    pub async fn get(&self, path: &str) -> Result<Response, ApiError> {
        self.execute(self.request(Method::GET, path)).await
    }
}

/// Reads the `Last-Modified-Version` header from a response
///
/// # Errors
/// Returns `ApiError::MissingHeader` when absent or unparseable; the
/// protocol requires the header on listing and write responses.
pub fn last_modified_version(response: &Response) -> Result<Version, ApiError> {
    header_version(response.headers())
        .ok_or(ApiError::MissingHeader(LAST_MODIFIED_VERSION))
}

/// Reads the `Last-Modified-Version` header if present
pub fn header_version(headers: &HeaderMap) -> Option<Version> {
    headers
        .get(LAST_MODIFIED_VERSION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Version::new)
}

/// Reads the `Total-Results` header from a response
pub fn total_results(response: &Response) -> Option<usize> {
    response
        .headers()
        .get(TOTAL_RESULTS)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
}
