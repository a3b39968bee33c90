//! Version listings, tombstone feed, and group/key queries
//!
//! Implements the incremental side of the protocol: `format=versions`
//! listings paginated via `start`/`limit` query parameters, looping until
//! `Total-Results <= start + page length`, plus the deletion feed and the
//! group and key metadata endpoints.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use bibsync_core::domain::newtypes::{LibraryId, ObjectKey, Version};
use bibsync_core::domain::object::ObjectKind;
use bibsync_core::ports::library_service::{KeyInfo, RemoteDeletions, RemoteGroup, VersionListing};

use crate::client::{last_modified_version, total_results, ApiClient};
use crate::ApiError;

/// Default page size for version listings (the remote cap)
pub const DEFAULT_PAGE_SIZE: u32 = 100;

// ============================================================================
// format=versions listing
// ============================================================================

/// Lists keys of one kind changed since `since`, following pagination
///
/// Issues `GET /groups/{id}/{kind}?since&format=versions&limit&start`,
/// merging pages until the reported `Total-Results` is exhausted. The
/// maximum `Last-Modified-Version` across all pages becomes the caller's
/// watermark candidate.
///
/// # Errors
/// Fails on transport errors, conflict statuses, a missing
/// `Last-Modified-Version` header, or a malformed body.
pub async fn list_object_versions(
    client: &ApiClient,
    library: LibraryId,
    kind: ObjectKind,
    since: Version,
    page_size: u32,
) -> Result<VersionListing, ApiError> {
    let mut listing = VersionListing::default();
    let mut start: usize = 0;
    let mut page: u32 = 0;

    loop {
        let path = format!(
            "/groups/{}/{}?since={}&format=versions&limit={}&start={}",
            library,
            kind.path_segment(),
            since,
            page_size,
            start
        );

        let response = client.get(&path).await?;
        listing.last_modified = listing.last_modified.max(last_modified_version(&response)?);
        let total = total_results(&response).unwrap_or(0);

        let body: HashMap<String, u64> = response.json().await?;
        let page_len = body.len();
        page += 1;

        debug!(
            library = %library,
            kind = %kind,
            page,
            entries = page_len,
            total,
            "Received version listing page"
        );

        for (raw_key, version) in body {
            let key = ObjectKey::new(raw_key)
                .map_err(|e| ApiError::Malformed(format!("bad key in version listing: {e}")))?;
            listing.versions.insert(key, Version::new(version));
        }

        if total <= start + page_len || page_len == 0 {
            break;
        }
        start += page_len;
    }

    debug!(
        library = %library,
        kind = %kind,
        changed = listing.versions.len(),
        last_modified = %listing.last_modified,
        "Version listing complete"
    );

    Ok(listing)
}

// ============================================================================
// Deletion feed
// ============================================================================

/// Wire shape of the tombstone feed
#[derive(Debug, Deserialize)]
struct DeletedResponse {
    #[serde(default)]
    collections: Vec<String>,
    #[serde(default)]
    items: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Fetches the remote tombstone feed since `since`
///
/// `GET /groups/{id}/deleted?since=…`. Malformed keys in the feed are
/// logged and skipped; a stale feed must not poison the whole cycle.
pub async fn deletions(
    client: &ApiClient,
    library: LibraryId,
    since: Version,
) -> Result<RemoteDeletions, ApiError> {
    let path = format!("/groups/{library}/deleted?since={since}");
    let response = client.get(&path).await?;
    let last_modified = last_modified_version(&response)?;
    let body: DeletedResponse = response.json().await?;

    let parse = |raw: Vec<String>, kind: &str| -> Vec<ObjectKey> {
        raw.into_iter()
            .filter_map(|k| match ObjectKey::new(k) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(kind, error = %e, "Skipping malformed key in deletion feed");
                    None
                }
            })
            .collect()
    };

    Ok(RemoteDeletions {
        collections: parse(body.collections, "collection"),
        items: parse(body.items, "item"),
        tags: parse(body.tags, "tag"),
        last_modified,
    })
}

// ============================================================================
// Group queries
// ============================================================================

/// Lists the libraries visible to the key with their current versions
///
/// `GET /users/{id}/groups?format=versions` returns a map of library id to
/// whole-library version.
pub async fn group_versions(
    client: &ApiClient,
) -> Result<HashMap<LibraryId, Version>, ApiError> {
    let path = format!("/users/{}/groups?format=versions", client.user_id());
    let response = client.get(&path).await?;
    let body: HashMap<String, u64> = response.json().await?;

    let mut out = HashMap::with_capacity(body.len());
    for (raw_id, version) in body {
        let id: i64 = raw_id
            .parse()
            .map_err(|_| ApiError::Malformed(format!("bad library id: {raw_id}")))?;
        let library = LibraryId::new(id)
            .map_err(|e| ApiError::Malformed(format!("bad library id: {e}")))?;
        out.insert(library, Version::new(version));
    }
    Ok(out)
}

/// Wire shape of a group metadata document
#[derive(Debug, Deserialize)]
struct GroupResponse {
    id: i64,
    version: u64,
    #[serde(default)]
    data: serde_json::Value,
}

/// Fetches one group's metadata (`GET /groups/{id}`)
pub async fn group(client: &ApiClient, library: LibraryId) -> Result<RemoteGroup, ApiError> {
    let path = format!("/groups/{library}");
    let response = client.get(&path).await?;
    let body: GroupResponse = response.json().await?;
    let id = LibraryId::new(body.id)
        .map_err(|e| ApiError::Malformed(format!("bad group id: {e}")))?;
    Ok(RemoteGroup {
        id,
        version: Version::new(body.version),
        data: body.data,
    })
}

// ============================================================================
// Key verification
// ============================================================================

/// Wire shape of the key document
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyResponse {
    #[serde(rename = "userID")]
    user_id: i64,
    username: String,
    #[serde(default)]
    access: KeyAccess,
}

#[derive(Debug, Default, Deserialize)]
struct KeyAccess {
    #[serde(default)]
    groups: HashMap<String, GroupAccess>,
}

#[derive(Debug, Deserialize)]
struct GroupAccess {
    #[serde(default)]
    library: bool,
    #[serde(default)]
    write: bool,
}

/// Verifies the API key (`GET /keys/current`)
///
/// The `access.groups` map may carry an `"all"` entry granting blanket
/// access; only concrete library ids are reported here, the blanket grant
/// is resolved by listing groups.
pub async fn verify_key(client: &ApiClient) -> Result<KeyInfo, ApiError> {
    let response = client.get("/keys/current").await?;
    let body: KeyResponse = response.json().await?;

    let mut readable = Vec::new();
    let mut writable = Vec::new();
    for (raw_id, access) in &body.access.groups {
        let Ok(id) = raw_id.parse::<i64>() else {
            continue; // "all" and other blanket entries
        };
        let Ok(library) = LibraryId::new(id) else {
            continue;
        };
        if access.library {
            readable.push(library);
        }
        if access.write {
            writable.push(library);
        }
    }
    readable.sort();
    writable.sort();

    Ok(KeyInfo {
        user_id: body.user_id,
        username: body.username,
        readable,
        writable,
    })
}
