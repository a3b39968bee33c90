//! Shared rate governor for the remote library service
//!
//! The remote service advises clients with two headers: `Retry-After`
//! (mandatory pause after a rate-limit violation) and `Backoff` (advisory
//! pause that may arrive on *any* response, success or failure). Both
//! describe the caller's account-wide budget, not a per-library budget, so
//! one governor instance is shared by every call site in the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use bibsync_api::governor::RateGovernor;
//!
//! # async fn example(headers: &reqwest::header::HeaderMap) {
//! let governor = RateGovernor::new();
//! governor.await_ready().await;
//! // ... make API call ...
//! governor.observe(headers);
//! # }
//! ```

use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use tracing::{debug, warn};

/// Header carrying the mandatory pause after a rate-limit violation
pub const RETRY_AFTER: &str = "Retry-After";

/// Header carrying the advisory pause, present on any response
pub const BACKOFF: &str = "Backoff";

/// Longest cooldown the governor will honor from a header (one hour)
const MAX_COOLDOWN: Duration = Duration::from_secs(3600);

/// Process-wide rate-limit governor
///
/// Records server-advised cooldowns and blocks callers until they expire.
/// No request is issued while a mandated sleep is outstanding. Share via
/// `Arc<RateGovernor>` across clients; cooldowns from concurrent responses
/// extend (never shorten) the current one.
#[derive(Debug, Default)]
pub struct RateGovernor {
    /// Instant until which all calls must hold off
    cooldown_until: Mutex<Option<Instant>>,
}

impl RateGovernor {
    /// Creates a governor with no active cooldown
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records any Backoff/Retry-After advice found in response headers
    ///
    /// Called on EVERY response, success or failure, before control
    /// returns to the caller.
    pub fn observe(&self, headers: &HeaderMap) {
        if let Some(pause) = header_duration(headers, BACKOFF) {
            debug!(secs = pause.as_secs(), "Remote requested advisory backoff");
            self.penalize(pause);
        }
        if let Some(pause) = header_duration(headers, RETRY_AFTER) {
            warn!(secs = pause.as_secs(), "Remote mandated a retry-after pause");
            self.penalize(pause);
        }
    }

    /// Arms (or extends) the cooldown
    pub fn penalize(&self, pause: Duration) {
        let pause = pause.min(MAX_COOLDOWN);
        let until = Instant::now() + pause;
        let mut guard = self.cooldown_until.lock().unwrap();
        match *guard {
            Some(current) if current >= until => {}
            _ => *guard = Some(until),
        }
    }

    /// Returns the remaining cooldown, if any
    #[must_use]
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let guard = self.cooldown_until.lock().unwrap();
        guard.and_then(|until| until.checked_duration_since(Instant::now()))
    }

    /// Blocks until the cooldown has expired
    ///
    /// Returns immediately when no cooldown is armed. Synchronous
    /// backpressure, not exponential backoff: the sleep duration is
    /// exactly what the server mandated.
    pub async fn await_ready(&self) {
        while let Some(remaining) = self.cooldown_remaining() {
            debug!(
                wait_ms = remaining.as_millis() as u64,
                "Holding request until governor cooldown expires"
            );
            tokio::time::sleep(remaining).await;
        }
    }
}

/// Reads a pause duration from a header, if present and parseable
fn header_duration(headers: &HeaderMap, name: &str) -> Option<Duration> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(parse_pause)
}

/// Parses a pause header value into a Duration.
///
/// The value can be either:
/// - a number of seconds (integer or fractional, e.g. "30" or "2.5")
/// - an HTTP-date (e.g. "Fri, 31 Dec 2027 23:59:59 GMT")
///
/// Unparseable values fall back to a conservative 10 seconds.
pub fn parse_pause(value: &str) -> Duration {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(seconds) = value.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Duration::from_secs_f64(seconds);
        }
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            if let Ok(secs) = u64::try_from((target - now).num_seconds()) {
                return Duration::from_secs(secs).min(MAX_COOLDOWN);
            }
        }
        return Duration::ZERO;
    }

    warn!(value, "Could not parse pause header, using fallback");
    Duration::from_secs(10)
}
