//! Folder creation, uploads and deletion

use bytes::Bytes;
use drivemirror_core::domain::RemoteId;
use drivemirror_core::ports::IRemoteStore;
use serde_json::json;
use wiremock::matchers::{body_bytes, body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{file_json, folder_json, setup, TOKEN};

fn id(s: &str) -> RemoteId {
    RemoteId::new(s.to_string()).unwrap()
}

#[tokio::test]
async fn test_create_folder() {
    let (server, store) = setup().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .and(body_partial_json(json!({
            "name": "docs",
            "mimeType": "application/vnd.google-apps.folder",
            "parents": ["parent-1"],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(folder_json("new-folder", "docs")))
        .expect(1)
        .mount(&server)
        .await;

    let created = store.create_folder("docs", &id("parent-1")).await.unwrap();
    assert_eq!(created, id("new-folder"));
    server.verify().await;
}

#[tokio::test]
async fn test_create_file_uses_multipart_upload() {
    let (server, store) = setup().await;
    Mock::given(method("POST"))
        .and(path("/upload/files"))
        .and(query_param("uploadType", "multipart"))
        .and(body_string_contains("\"name\":\"a.txt\""))
        .and(body_string_contains("\"parents\":[\"parent-1\"]"))
        .and(body_string_contains("Content-Type: text/plain\r\n\r\nhello world\r\n"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
            "new-file",
            "a.txt",
            "text/plain",
            Some("5eb63bbbe01eeed093cb22bb8f5acdc3"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let created = store
        .create_file("a.txt", &id("parent-1"), Bytes::from_static(b"hello world"), "text/plain")
        .await
        .unwrap();
    assert_eq!(created, id("new-file"));

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0].headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/related; boundary="));
}

#[tokio::test]
async fn test_update_file_content_uses_media_upload() {
    let (server, store) = setup().await;
    Mock::given(method("PATCH"))
        .and(path("/upload/files/file-1"))
        .and(query_param("uploadType", "media"))
        .and(header("content-type", "image/png"))
        .and(body_bytes(vec![0x89, 0x50, 0x4e, 0x47]))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
            "file-1",
            "logo.png",
            "image/png",
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    store
        .update_file_content(&id("file-1"), Bytes::from_static(&[0x89, 0x50, 0x4e, 0x47]), "image/png")
        .await
        .unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_delete_node() {
    let (server, store) = setup().await;
    Mock::given(method("DELETE"))
        .and(path("/files/old-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store.delete_node(&id("old-1")).await.unwrap();
    server.verify().await;
}
