//! HTTP failure classification and token refresh

use std::sync::Arc;
use std::time::Duration;

use drivemirror_core::config::RateLimitingConfig;
use drivemirror_core::domain::RemoteId;
use drivemirror_core::ports::{IRemoteStore, RemoteError};
use drivemirror_gdrive::client::DriveClient;
use drivemirror_gdrive::provider::DriveRemoteStore;
use drivemirror_gdrive::rate_limit::{AdaptiveRateLimiter, RequestClass};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{error_body, setup, StaticRefresher, TOKEN};

fn id(s: &str) -> RemoteId {
    RemoteId::new(s.to_string()).unwrap()
}

async fn delete_failing_with(template: ResponseTemplate) -> RemoteError {
    let (server, store) = setup().await;
    Mock::given(method("DELETE"))
        .and(path("/files/f1"))
        .respond_with(template)
        .mount(&server)
        .await;
    store.delete_node(&id("f1")).await.unwrap_err()
}

#[tokio::test]
async fn test_unauthorized_without_refresher_is_auth() {
    let err = delete_failing_with(
        ResponseTemplate::new(401).set_body_json(error_body(401, "authError", "Invalid Credentials")),
    )
    .await;
    assert_eq!(err, RemoteError::Auth("Invalid Credentials".to_string()));
}

#[tokio::test]
async fn test_quota_exceeded() {
    let err = delete_failing_with(
        ResponseTemplate::new(403).set_body_json(error_body(403, "storageQuotaExceeded", "full")),
    )
    .await;
    assert!(matches!(err, RemoteError::QuotaExceeded(_)));
}

#[tokio::test]
async fn test_rate_limit_403_is_transient() {
    let err = delete_failing_with(
        ResponseTemplate::new(403).set_body_json(error_body(403, "userRateLimitExceeded", "slow")),
    )
    .await;
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_other_403_is_permission_denied() {
    let err = delete_failing_with(
        ResponseTemplate::new(403)
            .set_body_json(error_body(403, "insufficientFilePermissions", "read only")),
    )
    .await;
    assert!(matches!(err, RemoteError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_429_carries_retry_after() {
    let err = delete_failing_with(ResponseTemplate::new(429).insert_header("Retry-After", "3")).await;
    assert!(err.is_transient());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let err = delete_failing_with(ResponseTemplate::new(503).set_body_string("backend down")).await;
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_item_rejections() {
    for status in [400, 409, 413] {
        let err = delete_failing_with(
            ResponseTemplate::new(status).set_body_json(error_body(status, "badRequest", "no")),
        )
        .await;
        assert!(err.is_item_scoped(), "HTTP {status}: {err}");
    }
}

#[tokio::test]
async fn test_not_found() {
    let err = delete_failing_with(
        ResponseTemplate::new(404).set_body_json(error_body(404, "notFound", "File not found: f1")),
    )
    .await;
    assert_eq!(err, RemoteError::NotFound("File not found: f1".to_string()));
}

#[tokio::test]
async fn test_malformed_success_body_is_fatal() {
    let (server, store) = setup().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = store.create_folder("docs", &id("p1")).await.unwrap_err();
    assert!(matches!(err, RemoteError::Fatal(_)));
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    // Reserve a free port, then release it so connections are refused
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let store = DriveRemoteStore::new(DriveClient::with_base_url(
        TOKEN,
        format!("http://127.0.0.1:{port}"),
    ));
    let err = store.delete_node(&id("f1")).await.unwrap_err();
    assert!(err.is_transient(), "{err}");
}

#[tokio::test]
async fn test_unauthorized_refreshes_once_and_retries() {
    let (server, store) = setup().await;
    let refresher = StaticRefresher::new("fresh-token");
    let store = store.with_refresher(refresher.clone());

    Mock::given(method("DELETE"))
        .and(path("/files/f1"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(401).set_body_json(error_body(401, "authError", "expired")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/files/f1"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store.delete_node(&id("f1")).await.unwrap();
    assert_eq!(refresher.calls(), 1);
    assert_eq!(store.client().access_token(), "fresh-token");
    server.verify().await;
}

#[tokio::test]
async fn test_second_unauthorized_is_surfaced() {
    let (server, store) = setup().await;
    let refresher = StaticRefresher::new("still-bad");
    let store = store.with_refresher(refresher.clone());

    Mock::given(method("DELETE"))
        .and(path("/files/f1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": 401, "message": "revoked" }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let err = store.delete_node(&id("f1")).await.unwrap_err();
    assert_eq!(err, RemoteError::Auth("revoked".to_string()));
    assert_eq!(refresher.calls(), 1);
    server.verify().await;
}

#[tokio::test]
async fn test_throttle_reduces_rate_limiter_capacity() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/files/f1"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let limiter = Arc::new(AdaptiveRateLimiter::with_defaults());
    let client = DriveClient::with_base_url(TOKEN, server.uri()).with_rate_limiter(limiter.clone());

    let err = client.delete("f1").await.unwrap_err();
    assert!(err.is_throttle());
    assert_eq!(
        limiter.effective_capacity(RequestClass::Write),
        RateLimitingConfig::default().write_requests_per_minute / 2
    );
    assert_eq!(
        limiter.effective_capacity(RequestClass::List),
        RateLimitingConfig::default().list_requests_per_minute
    );
}
