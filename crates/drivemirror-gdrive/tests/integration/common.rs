//! Shared helpers for Drive API integration tests
//!
//! Each helper mounts mock endpoints on a wiremock server; `setup` returns
//! a [`DriveRemoteStore`] whose client points at that server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use drivemirror_gdrive::client::DriveClient;
use drivemirror_gdrive::provider::{DriveRemoteStore, TokenRefresher};

pub const TOKEN: &str = "test-access-token";

pub async fn setup() -> (MockServer, DriveRemoteStore) {
    let server = MockServer::start().await;
    let store = DriveRemoteStore::new(DriveClient::with_base_url(TOKEN, server.uri()));
    (server, store)
}

/// Like [`setup`], with the client's resumable threshold and chunk size set
pub async fn setup_with_upload_limits(threshold: u64, chunk_size: u64) -> (MockServer, DriveRemoteStore) {
    let server = MockServer::start().await;
    let client = DriveClient::with_base_url(TOKEN, server.uri()).with_upload_limits(threshold, chunk_size);
    (server, DriveRemoteStore::new(client))
}

pub fn file_json(id: &str, name: &str, mime: &str, md5: Option<&str>) -> Value {
    let mut file = json!({
        "id": id,
        "name": name,
        "mimeType": mime,
        "parents": ["parent-1"],
        "modifiedTime": "2024-05-01T10:00:00.000Z",
    });
    if let Some(md5) = md5 {
        file["md5Checksum"] = json!(md5);
    }
    file
}

pub fn folder_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "mimeType": "application/vnd.google-apps.folder",
        "parents": ["parent-1"],
    })
}

/// Mounts a single-page `files.list` response for query `q`
pub async fn mount_list(server: &MockServer, q: &str, files: Value) {
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("q", q))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": files })))
        .mount(server)
        .await;
}

/// Mounts a two-page `files.list` response for query `q`
pub async fn mount_list_paginated(server: &MockServer, q: &str, first: Value, second: Value) {
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("q", q))
        .and(query_param_is_missing("pageToken"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "files": first, "nextPageToken": "page-2" })),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("q", q))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": second })))
        .expect(1)
        .mount(server)
        .await;
}

/// Drive's JSON error envelope
pub fn error_body(code: u16, reason: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message,
            "errors": [{ "domain": "global", "reason": reason, "message": message }],
        }
    })
}

/// Refresher handing out a fixed token and counting calls
pub struct StaticRefresher {
    token: String,
    calls: AtomicUsize,
}

impl StaticRefresher {
    pub fn new(token: &str) -> Arc<Self> {
        Arc::new(Self {
            token: token.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for StaticRefresher {
    async fn refresh_access_token(&self) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.token.clone())
    }
}
