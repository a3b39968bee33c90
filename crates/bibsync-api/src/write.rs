//! Batched object writes, deletes, and fetches
//!
//! The write side of the protocol: create/update batches of up to 50
//! objects per POST with optimistic concurrency via
//! `If-Unmodified-Since-Version`, structured per-object results keyed by
//! request index, batch deletes, and the batched full-object fetch used by
//! the download path.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use bibsync_core::domain::newtypes::{LibraryId, ObjectKey, Version};
use bibsync_core::domain::object::ObjectKind;
use bibsync_core::ports::library_service::{
    RemoteObject, WriteFailure, WriteOutcome, WrittenObject, FETCH_BATCH_LIMIT,
};

use crate::client::{header_version, ApiClient, IF_UNMODIFIED_SINCE_VERSION};
use crate::ApiError;

/// Returns the key-list query parameter name for one object kind
fn key_param(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Collection => "collectionKey",
        ObjectKind::Item => "itemKey",
        ObjectKind::Tag => "tagKey",
    }
}

/// Rejects batches over the remote hard limit
fn check_batch_len(len: usize) -> Result<(), ApiError> {
    if len > FETCH_BATCH_LIMIT {
        return Err(ApiError::BatchTooLarge {
            limit: FETCH_BATCH_LIMIT,
            len,
        });
    }
    Ok(())
}

// ============================================================================
// Batch fetch
// ============================================================================

/// Wire shape of a fetched object
#[derive(Debug, Deserialize)]
struct WireObject {
    key: String,
    version: u64,
    #[serde(default)]
    data: serde_json::Value,
}

/// Fetches full objects for up to 50 keys
///
/// `GET /groups/{id}/{kind}?{kind}Key=k1,k2,…&includeTrashed=1` — trashed
/// objects are included so their tombstone state reconciles like any other
/// change.
///
/// # Errors
/// Fails if more than [`FETCH_BATCH_LIMIT`] keys are passed.
pub async fn fetch_objects(
    client: &ApiClient,
    library: LibraryId,
    kind: ObjectKind,
    keys: &[ObjectKey],
) -> Result<Vec<RemoteObject>, ApiError> {
    check_batch_len(keys.len())?;
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let joined = keys
        .iter()
        .map(ObjectKey::as_str)
        .collect::<Vec<_>>()
        .join(",");
    let path = format!(
        "/groups/{}/{}?{}={}&includeTrashed=1",
        library,
        kind.path_segment(),
        key_param(kind),
        joined
    );

    let response = client.get(&path).await?;
    let body: Vec<WireObject> = response.json().await?;

    debug!(
        library = %library,
        kind = %kind,
        requested = keys.len(),
        returned = body.len(),
        "Fetched object batch"
    );

    body.into_iter()
        .map(|wire| {
            let key = ObjectKey::new(wire.key)
                .map_err(|e| ApiError::Malformed(format!("bad key in fetched object: {e}")))?;
            Ok(RemoteObject {
                key,
                version: Version::new(wire.version),
                data: wire.data,
            })
        })
        .collect()
}

// ============================================================================
// Batch write
// ============================================================================

/// Wire shape of a batch write response
///
/// Maps are keyed by the request index, as decimal strings.
#[derive(Debug, Deserialize)]
struct WriteResponse {
    #[serde(default)]
    success: BTreeMap<String, String>,
    #[serde(default)]
    unchanged: BTreeMap<String, String>,
    #[serde(default)]
    failed: BTreeMap<String, WireFailure>,
}

#[derive(Debug, Deserialize)]
struct WireFailure {
    code: u16,
    #[serde(default)]
    message: String,
}

/// Creates or updates up to 50 objects in one conditional POST
///
/// The `If-Unmodified-Since-Version` header carries the caller's last
/// known remote high-water version; the remote rejects the whole batch
/// with 412 when the library moved past it. Per-object failures arrive in
/// the `failed` map and never abort sibling entries.
pub async fn write_objects(
    client: &ApiClient,
    library: LibraryId,
    kind: ObjectKind,
    payloads: &[serde_json::Value],
    if_unmodified_since: Version,
) -> Result<WriteOutcome, ApiError> {
    check_batch_len(payloads.len())?;
    if payloads.is_empty() {
        return Ok(WriteOutcome::default());
    }

    let path = format!("/groups/{}/{}", library, kind.path_segment());
    let request = client
        .request(Method::POST, &path)
        .header(IF_UNMODIFIED_SINCE_VERSION, if_unmodified_since.to_string())
        .json(payloads);

    let response = client.execute(request).await?;
    let last_modified = header_version(response.headers());
    let body: WriteResponse = response.json().await?;

    let stamped = last_modified.unwrap_or(Version::ZERO);
    let mut outcome = WriteOutcome {
        last_modified,
        ..WriteOutcome::default()
    };

    for (index, raw_key) in body.success {
        let index = parse_index(&index)?;
        let key = ObjectKey::new(raw_key)
            .map_err(|e| ApiError::Malformed(format!("bad key in write result: {e}")))?;
        outcome.success.insert(
            index,
            WrittenObject {
                key,
                version: stamped,
            },
        );
    }

    for (index, raw_key) in body.unchanged {
        let index = parse_index(&index)?;
        let key = ObjectKey::new(raw_key)
            .map_err(|e| ApiError::Malformed(format!("bad key in write result: {e}")))?;
        outcome.unchanged.insert(index, key);
    }

    for (index, failure) in body.failed {
        let index = parse_index(&index)?;
        outcome.failed.insert(
            index,
            WriteFailure {
                code: failure.code,
                message: failure.message,
            },
        );
    }

    debug!(
        library = %library,
        kind = %kind,
        sent = payloads.len(),
        success = outcome.success.len(),
        unchanged = outcome.unchanged.len(),
        failed = outcome.failed.len(),
        "Batch write applied"
    );

    Ok(outcome)
}

/// Deletes up to 50 objects by key in one conditional DELETE
pub async fn delete_objects(
    client: &ApiClient,
    library: LibraryId,
    kind: ObjectKind,
    keys: &[ObjectKey],
    if_unmodified_since: Version,
) -> Result<(), ApiError> {
    check_batch_len(keys.len())?;
    if keys.is_empty() {
        return Ok(());
    }

    let joined = keys
        .iter()
        .map(ObjectKey::as_str)
        .collect::<Vec<_>>()
        .join(",");
    let path = format!(
        "/groups/{}/{}?{}={}",
        library,
        kind.path_segment(),
        key_param(kind),
        joined
    );

    let request = client
        .request(Method::DELETE, &path)
        .header(IF_UNMODIFIED_SINCE_VERSION, if_unmodified_since.to_string());
    client.execute(request).await?;

    debug!(
        library = %library,
        kind = %kind,
        deleted = keys.len(),
        "Batch delete applied"
    );
    Ok(())
}

/// Parses a decimal-string request index from a write response
fn parse_index(raw: &str) -> Result<usize, ApiError> {
    raw.parse::<usize>()
        .map_err(|_| ApiError::Malformed(format!("bad index in write result: {raw}")))
}
