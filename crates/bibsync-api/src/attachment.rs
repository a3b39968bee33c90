//! Attachment transfer wire protocol
//!
//! Binary attachment content moves through a three-step, checksum-gated
//! protocol:
//!
//! 1. **Authorize** — a conditional POST (`If-None-Match: *` for the first
//!    upload, `If-Match: <previousMD5>` otherwise) carrying
//!    md5/filename/filesize/mtime. An `{"exists": 1}` response
//!    short-circuits: the remote already has this content. Otherwise the
//!    response carries a presigned `url`, `contentType`, `prefix`/`suffix`
//!    framing bytes and an `uploadKey`.
//! 2. **Upload** — PUT the framed payload directly to the presigned
//!    endpoint, expecting HTTP 201. The endpoint is a foreign host: no
//!    bearer auth, no governor.
//! 3. **Register** — a second conditional POST carrying the `uploadKey`,
//!    expecting HTTP 204. A 412 here means the remote content changed
//!    concurrently; the whole attachment sync is retried from step 1 on
//!    the next cycle, not immediately.

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use bibsync_core::domain::newtypes::{LibraryId, ObjectKey};
use bibsync_core::ports::library_service::{
    AttachmentContent, UploadAuthorization, UploadRequest, UploadTicket,
};

use crate::client::ApiClient;
use crate::ApiError;

/// Wire shape of an authorization response
///
/// Either the short-circuit `{"exists": 1}` or a full upload ticket.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuthorizeResponse {
    Exists {
        #[allow(dead_code)]
        exists: u8,
    },
    Granted {
        url: String,
        #[serde(rename = "contentType")]
        content_type: String,
        #[serde(default)]
        prefix: String,
        #[serde(default)]
        suffix: String,
        #[serde(rename = "uploadKey")]
        upload_key: String,
    },
}

/// Returns the conditional header for the attachment endpoints
///
/// `previous_md5` is the last digest confirmed by the remote; its absence
/// means first upload.
fn conditional_header(previous_md5: Option<&str>) -> (&'static str, String) {
    match previous_md5 {
        Some(md5) => ("If-Match", md5.to_string()),
        None => ("If-None-Match", "*".to_string()),
    }
}

/// Step 1: requests upload authorization for an attachment's content
pub async fn authorize_upload(
    client: &ApiClient,
    library: LibraryId,
    item: &ObjectKey,
    request: &UploadRequest,
    previous_md5: Option<&str>,
) -> Result<UploadAuthorization, ApiError> {
    let path = format!("/groups/{library}/items/{item}/file");
    let (header, value) = conditional_header(previous_md5);

    let form = [
        ("md5", request.md5.clone()),
        ("filename", request.filename.clone()),
        ("filesize", request.filesize.to_string()),
        ("mtime", request.mtime.to_string()),
    ];

    let http_request = client
        .request(Method::POST, &path)
        .header(header, value)
        .form(&form);
    let response = client.execute(http_request).await?;
    let body: AuthorizeResponse = response.json().await?;

    match body {
        AuthorizeResponse::Exists { .. } => {
            info!(library = %library, item = %item, "Remote already has this content");
            Ok(UploadAuthorization::Exists)
        }
        AuthorizeResponse::Granted {
            url,
            content_type,
            prefix,
            suffix,
            upload_key,
        } => {
            debug!(library = %library, item = %item, "Upload authorized");
            Ok(UploadAuthorization::Granted(UploadTicket {
                url,
                content_type,
                prefix,
                suffix,
                upload_key,
            }))
        }
    }
}

/// Step 2: PUTs the framed payload to the presigned endpoint
///
/// The payload is `prefix + bytes + suffix` exactly as the ticket framed
/// it. Expects HTTP 201.
pub async fn upload_payload(
    client: &ApiClient,
    ticket: &UploadTicket,
    bytes: &[u8],
) -> Result<(), ApiError> {
    let mut body = Vec::with_capacity(ticket.prefix.len() + bytes.len() + ticket.suffix.len());
    body.extend_from_slice(ticket.prefix.as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(ticket.suffix.as_bytes());

    debug!(
        url = %ticket.url,
        payload = body.len(),
        "Uploading framed payload to presigned endpoint"
    );

    // Presigned URL on a foreign host: plain client, no bearer auth.
    let response = client
        .http_client()
        .put(&ticket.url)
        .header("Content-Type", &ticket.content_type)
        .body(body)
        .send()
        .await?;

    if response.status() != StatusCode::CREATED {
        return Err(ApiError::Http {
            status: response.status(),
            path: ticket.url.clone(),
        });
    }
    Ok(())
}

/// Step 3: registers the completed upload
///
/// Expects HTTP 204. A 412 surfaces as `ApiError::VersionMismatch`: the
/// remote content changed between authorization and registration, and the
/// attachment must be re-synced from step 1 on the next cycle.
pub async fn register_upload(
    client: &ApiClient,
    library: LibraryId,
    item: &ObjectKey,
    upload_key: &str,
    previous_md5: Option<&str>,
) -> Result<(), ApiError> {
    let path = format!("/groups/{library}/items/{item}/file");
    let (header, value) = conditional_header(previous_md5);

    let request = client
        .request(Method::POST, &path)
        .header(header, value)
        .form(&[("upload", upload_key)]);
    let response = client.execute(request).await?;

    if response.status() != StatusCode::NO_CONTENT {
        return Err(ApiError::Http {
            status: response.status(),
            path,
        });
    }

    info!(library = %library, item = %item, "Upload registered");
    Ok(())
}

/// Downloads an attachment's binary content
///
/// Returns the bytes with the transfer's `ETag` checksum when the server
/// provided one (quotes stripped); callers fall back to computing the
/// digest locally.
pub async fn download_attachment(
    client: &ApiClient,
    library: LibraryId,
    item: &ObjectKey,
) -> Result<AttachmentContent, ApiError> {
    let path = format!("/groups/{library}/items/{item}/file");
    let response = client.get(&path).await?;

    let etag = response
        .headers()
        .get("ETag")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_string());

    let bytes = response.bytes().await?.to_vec();
    debug!(
        library = %library,
        item = %item,
        size = bytes.len(),
        has_etag = etag.is_some(),
        "Downloaded attachment content"
    );

    Ok(AttachmentContent { bytes, etag })
}
