//! Google Drive v3 HTTP client
//!
//! A thin typed wrapper over `reqwest` for the handful of Drive endpoints
//! the mirror needs: paged `files.list`, folder creation, uploads,
//! deletion, and `about` for account details.
//!
//! Uploads up to the resumable threshold go out in one multipart or media
//! request. Larger ones open a resumable session and send the content in
//! chunks, continuing from whatever offset Drive acknowledges.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use drivemirror_gdrive::client::DriveClient;
//! use drivemirror_gdrive::query;
//!
//! # async fn example() -> Result<(), drivemirror_gdrive::DriveError> {
//! let client = DriveClient::new("access-token-here");
//! let folders = client.list_all(&query::root_folder_named("Backups")).await?;
//! println!("{} matching folders", folders.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Notes
//!
//! - The client does not retry. Every non-success status becomes a
//!   [`DriveError`] and the caller decides what is worth retrying.
//! - The access token sits behind a lock so a refreshed token can be
//!   installed while requests are in flight on other tasks.
//! - Redirects are never followed: Drive answers an accepted chunk with
//!   `308 Resume Incomplete`, which must reach the upload loop.

use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header, redirect, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::query::FOLDER_MIME;
use crate::rate_limit::{parse_retry_after, AdaptiveRateLimiter, RequestClass};
use crate::DriveError;

/// Base URL for Drive v3 metadata requests
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Base URL for Drive v3 media uploads
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Default size above which uploads use a resumable session: 5 MiB
pub const DEFAULT_RESUMABLE_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Default resumable chunk size: 8 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Drive requires every chunk but the last to be a multiple of 256 KiB
const CHUNK_GRANULARITY: u64 = 256 * 1024;

/// Largest page Drive serves for `files.list`
const PAGE_SIZE: &str = "1000";

/// Fields requested for every file resource
const FILE_FIELDS: &str = "id,name,mimeType,parents,modifiedTime,md5Checksum";

/// Fields requested for a `files.list` page
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,parents,modifiedTime,md5Checksum)";

/// Fields requested from `about.get`
const ABOUT_FIELDS: &str = "user(displayName,emailAddress),storageQuota(limit,usage)";

// ============================================================================
// Drive API resource types
// ============================================================================

/// A Drive file resource, restricted to the requested fields
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    pub modified_time: Option<DateTime<Utc>>,
    pub md5_checksum: Option<String>,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutResponse {
    user: Option<AboutUser>,
    storage_quota: Option<StorageQuota>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutUser {
    display_name: Option<String>,
    email_address: Option<String>,
}

/// Drive reports quota figures as decimal strings
#[derive(Debug, Deserialize)]
struct StorageQuota {
    limit: Option<String>,
    usage: Option<String>,
}

/// Account details from `about.get`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub display_name: String,
    pub email: String,
    pub quota_used: u64,
    /// `None` for accounts without a storage limit
    pub quota_total: Option<u64>,
}

// ============================================================================
// DriveClient
// ============================================================================

/// HTTP client for the Drive v3 API
pub struct DriveClient {
    client: Client,
    api_base: String,
    upload_base: String,
    access_token: RwLock<String>,
    rate_limiter: Option<Arc<AdaptiveRateLimiter>>,
    resumable_threshold: u64,
    chunk_size: u64,
}

/// HTTP client that hands redirect statuses back to the caller
fn http_client() -> Client {
    Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        // Fails only when the TLS backend cannot be initialized
        .unwrap_or_else(|_| Client::new())
}

impl DriveClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
            access_token: RwLock::new(access_token.into()),
            rate_limiter: None,
            resumable_threshold: DEFAULT_RESUMABLE_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Client against a custom server (useful for testing)
    ///
    /// Metadata requests go to `base_url`, uploads to `{base_url}/upload`.
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let api_base = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: http_client(),
            upload_base: format!("{api_base}/upload"),
            api_base,
            access_token: RwLock::new(access_token.into()),
            rate_limiter: None,
            resumable_threshold: DEFAULT_RESUMABLE_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets when uploads switch to a resumable session and the chunk size
    ///
    /// `chunk_size` is rounded down to a multiple of 256 KiB, with 256 KiB
    /// as the floor.
    pub fn with_upload_limits(mut self, resumable_threshold: u64, chunk_size: u64) -> Self {
        self.resumable_threshold = resumable_threshold;
        self.chunk_size = (chunk_size / CHUNK_GRANULARITY).max(1) * CHUNK_GRANULARITY;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<AdaptiveRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn rate_limiter(&self) -> Option<&Arc<AdaptiveRateLimiter>> {
        self.rate_limiter.as_ref()
    }

    /// Installs a new access token (e.g., after a refresh)
    pub fn set_access_token(&self, token: impl Into<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token.into();
        debug!("Updated DriveClient access token");
    }

    pub fn access_token(&self) -> String {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Authenticated request builder for an absolute URL
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(self.access_token())
    }

    /// Sends a request under the rate limiter and turns error statuses into [`DriveError`]
    async fn send(&self, class: RequestClass, request: RequestBuilder) -> Result<Response, DriveError> {
        self.send_accepting(class, request, |status| status.is_success())
            .await
    }

    /// Like [`Self::send`], with `accept` deciding which statuses are not errors
    async fn send_accepting(
        &self,
        class: RequestClass,
        request: RequestBuilder,
        accept: fn(StatusCode) -> bool,
    ) -> Result<Response, DriveError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire(class).await;
        }

        let response = request.send().await?;
        let status = response.status();
        if accept(status) {
            if let Some(limiter) = &self.rate_limiter {
                limiter.on_success(class);
            }
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();
        let err = DriveError::from_status(status, retry_after, &body);

        if err.is_throttle() {
            if let Some(limiter) = &self.rate_limiter {
                limiter.on_throttle(class);
            }
        }
        warn!(class = %class, status = status.as_u16(), error = %err, "Drive request failed");
        Err(err)
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, DriveError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| DriveError::InvalidResponse(e.to_string()))
    }

    /// Runs a `files.list` query, following `nextPageToken` until exhausted
    pub async fn list_all(&self, query: &str) -> Result<Vec<DriveFile>, DriveError> {
        let url = format!("{}/files", self.api_base);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let mut request = self.request(Method::GET, &url).query(&[
                ("q", query),
                ("fields", LIST_FIELDS),
                ("pageSize", PAGE_SIZE),
                ("spaces", "drive"),
            ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: FileList = Self::json(self.send(RequestClass::List, request).await?).await?;
            pages += 1;
            files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(query, pages, count = files.len(), "Listed files");
        Ok(files)
    }

    /// Creates a folder under `parent_id`
    pub async fn create_folder(&self, name: &str, parent_id: &str) -> Result<DriveFile, DriveError> {
        let url = format!("{}/files", self.api_base);
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent_id],
        });
        let request = self
            .request(Method::POST, &url)
            .query(&[("fields", FILE_FIELDS)])
            .json(&metadata);

        Self::json(self.send(RequestClass::Write, request).await?).await
    }

    /// Creates a file with content under `parent_id`
    ///
    /// Small files go out in one `multipart/related` request, larger ones
    /// through a resumable session.
    pub async fn upload_new(
        &self,
        name: &str,
        parent_id: &str,
        content: Bytes,
        mime_type: &str,
    ) -> Result<DriveFile, DriveError> {
        let url = format!("{}/files", self.upload_base);
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id],
        });

        if self.is_resumable(&content) {
            let session = self
                .create_upload_session(Method::POST, &url, &metadata, &content, mime_type)
                .await?;
            return self.upload_chunks(&session, content).await;
        }

        let boundary = multipart_boundary(&content);
        let body = multipart_body(&boundary, &metadata, &content, mime_type);

        let request = self
            .request(Method::POST, &url)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body);

        Self::json(self.send(RequestClass::Upload, request).await?).await
    }

    /// Replaces the content of an existing file
    pub async fn update_content(
        &self,
        file_id: &str,
        content: Bytes,
        mime_type: &str,
    ) -> Result<DriveFile, DriveError> {
        let url = format!("{}/files/{file_id}", self.upload_base);

        if self.is_resumable(&content) {
            let metadata = serde_json::json!({});
            let session = self
                .create_upload_session(Method::PATCH, &url, &metadata, &content, mime_type)
                .await?;
            return self.upload_chunks(&session, content).await;
        }

        let request = self
            .request(Method::PATCH, &url)
            .query(&[("uploadType", "media"), ("fields", FILE_FIELDS)])
            .header(header::CONTENT_TYPE, mime_type)
            .body(content);

        Self::json(self.send(RequestClass::Upload, request).await?).await
    }

    fn is_resumable(&self, content: &Bytes) -> bool {
        content.len() as u64 > self.resumable_threshold
    }

    /// Opens a resumable upload session and returns its URL
    ///
    /// `method` and `url` select create (`POST /files`) or update
    /// (`PATCH /files/{id}`). The session URL comes back in `Location`.
    async fn create_upload_session(
        &self,
        method: Method,
        url: &str,
        metadata: &serde_json::Value,
        content: &Bytes,
        mime_type: &str,
    ) -> Result<String, DriveError> {
        let request = self
            .request(method, url)
            .query(&[("uploadType", "resumable"), ("fields", FILE_FIELDS)])
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", content.len().to_string())
            .json(metadata);

        let response = self.send(RequestClass::Upload, request).await?;
        let session = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| {
                DriveError::InvalidResponse("upload session response has no Location header".into())
            })?;

        debug!(bytes = content.len(), "Opened resumable upload session");
        Ok(session)
    }

    /// Sends `content` to a resumable session chunk by chunk
    ///
    /// Each `308` names the last byte Drive stored; the next chunk starts
    /// right after it, so a partially stored chunk is resent from there.
    async fn upload_chunks(&self, session_url: &str, content: Bytes) -> Result<DriveFile, DriveError> {
        let total = content.len() as u64;
        let mut offset = 0u64;
        let mut chunks = 0u32;

        loop {
            let end = (offset + self.chunk_size).min(total);
            // Bounded by `total`, which came from a `usize`
            let chunk = content.slice(offset as usize..end as usize);
            let range = format!("bytes {offset}-{}/{total}", end - 1);
            debug!(range = %range, "Uploading chunk");

            let request = self
                .request(Method::PUT, session_url)
                .header(header::CONTENT_RANGE, range)
                .body(chunk);
            let response = self
                .send_accepting(RequestClass::Upload, request, |status| {
                    status.is_success() || status == StatusCode::PERMANENT_REDIRECT
                })
                .await?;
            chunks += 1;

            if response.status().is_success() {
                debug!(bytes = total, chunks, "Resumable upload completed");
                return Self::json(response).await;
            }

            let next = response
                .headers()
                .get(header::RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_range_end)
                .map_or(0, |last| last + 1);
            if next <= offset || next >= total {
                return Err(DriveError::InvalidResponse(format!(
                    "upload session stalled at byte {offset} of {total} (next offset {next})"
                )));
            }
            offset = next;
        }
    }

    /// Permanently deletes a file or folder, skipping the trash
    pub async fn delete(&self, file_id: &str) -> Result<(), DriveError> {
        let url = format!("{}/files/{file_id}", self.api_base);
        self.send(RequestClass::Write, self.request(Method::DELETE, &url))
            .await?;
        Ok(())
    }

    /// Fetches the account name, email and storage quota
    pub async fn about(&self) -> Result<AccountInfo, DriveError> {
        let url = format!("{}/about", self.api_base);
        let request = self
            .request(Method::GET, &url)
            .query(&[("fields", ABOUT_FIELDS)]);
        let about: AboutResponse = Self::json(self.send(RequestClass::List, request).await?).await?;

        let (display_name, email) = about
            .user
            .map(|u| (u.display_name, u.email_address))
            .unwrap_or_default();
        let parse = |v: Option<String>| v.and_then(|s| s.parse::<u64>().ok());
        let (usage, limit) = about
            .storage_quota
            .map(|q| (q.usage, q.limit))
            .unwrap_or_default();

        Ok(AccountInfo {
            display_name: display_name.unwrap_or_else(|| "Unknown User".to_string()),
            email: email.unwrap_or_default(),
            quota_used: parse(usage).unwrap_or(0),
            quota_total: parse(limit),
        })
    }
}

/// Last byte offset of a `Range: bytes=0-N` header
fn parse_range_end(value: &str) -> Option<u64> {
    let (_, end) = value.trim().strip_prefix("bytes=")?.split_once('-')?;
    end.parse().ok()
}

// ============================================================================
// multipart/related encoding
// ============================================================================

/// Picks a boundary string that does not occur in `content`
fn multipart_boundary(content: &[u8]) -> String {
    let mut attempt = 0u32;
    loop {
        let boundary = format!("drivemirror_boundary_{attempt:08x}");
        if !contains(content, boundary.as_bytes()) {
            return boundary;
        }
        attempt += 1;
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// JSON metadata part followed by the media part
fn multipart_body(
    boundary: &str,
    metadata: &serde_json::Value,
    content: &[u8],
    mime_type: &str,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("--{boundary}\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
