//! Root lookup, child listing and pagination

use drivemirror_core::domain::{NodeKind, RemoteId};
use drivemirror_core::ports::{IRemoteStore, RemoteError};
use drivemirror_gdrive::query;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{file_json, folder_json, mount_list, mount_list_paginated, setup};

fn id(s: &str) -> RemoteId {
    RemoteId::new(s.to_string()).unwrap()
}

#[tokio::test]
async fn test_find_root_folder_missing() {
    let (server, store) = setup().await;
    mount_list(&server, &query::root_folder_named("Backups"), json!([])).await;

    assert_eq!(store.find_root_folder("Backups").await.unwrap(), None);
}

#[tokio::test]
async fn test_find_root_folder_single_match() {
    let (server, store) = setup().await;
    mount_list(
        &server,
        &query::root_folder_named("Backups"),
        json!([folder_json("root-folder-1", "Backups")]),
    )
    .await;

    let found = store.find_root_folder("Backups").await.unwrap();
    assert_eq!(found, Some(id("root-folder-1")));
}

#[tokio::test]
async fn test_find_root_folder_ambiguous() {
    let (server, store) = setup().await;
    mount_list(
        &server,
        &query::root_folder_named("Backups"),
        json!([folder_json("a", "Backups"), folder_json("b", "Backups")]),
    )
    .await;

    let err = store.find_root_folder("Backups").await.unwrap_err();
    assert!(matches!(err, RemoteError::Fatal(ref m) if m.contains("ambiguous")));
}

#[tokio::test]
async fn test_root_query_escapes_quotes() {
    let (server, store) = setup().await;
    mount_list(
        &server,
        "'root' in parents and mimeType = 'application/vnd.google-apps.folder' \
         and name = 'it\\'s mine' and trashed = false",
        json!([folder_json("q1", "it's mine")]),
    )
    .await;

    assert_eq!(store.find_root_folder("it's mine").await.unwrap(), Some(id("q1")));
}

#[tokio::test]
async fn test_list_child_folders() {
    let (server, store) = setup().await;
    let parent = id("parent-1");
    mount_list(
        &server,
        &query::child_folders(&parent),
        json!([folder_json("d1", "docs"), folder_json("d2", "img")]),
    )
    .await;

    let folders = store.list_child_folders(&parent).await.unwrap();
    assert_eq!(folders.len(), 2);
    assert!(folders.iter().all(|f| f.kind == NodeKind::Folder));
    assert!(folders.iter().all(|f| f.parent_id == Some(id("parent-1"))));
    assert_eq!(folders[0].name, "docs");
}

#[tokio::test]
async fn test_list_files_follows_pagination() {
    let (server, store) = setup().await;
    let parent = id("parent-1");
    mount_list_paginated(
        &server,
        &query::child_files(&parent),
        json!([file_json("f1", "a.txt", "text/plain", Some("0cc175b9c0f1b6a831c399e269772661"))]),
        json!([file_json("f2", "b.txt", "text/plain", Some("92eb5ffee6ae2fec3ad71c777531578f"))]),
    )
    .await;

    let files = store.list_files(&parent).await.unwrap();
    let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
    server.verify().await;
}

#[tokio::test]
async fn test_list_files_applies_native_hash_rule() {
    let (server, store) = setup().await;
    let parent = id("parent-1");
    mount_list(
        &server,
        &query::child_files(&parent),
        json!([
            file_json("f1", "a.txt", "text/plain", Some("0cc175b9c0f1b6a831c399e269772661")),
            file_json("g1", "notes", "application/vnd.google-apps.document", None),
            file_json("g2", "sheet", "application/vnd.google-apps.spreadsheet",
                Some("0cc175b9c0f1b6a831c399e269772661")),
        ]),
    )
    .await;

    let files = store.list_files(&parent).await.unwrap();
    assert_eq!(files.len(), 3);
    assert_eq!(
        files[0].content_hash.as_ref().map(|h| h.as_str()),
        Some("0cc175b9c0f1b6a831c399e269772661")
    );
    assert!(files[1].content_hash.is_none());
    assert!(files[2].content_hash.is_none());
    assert!(files.iter().all(|f| f.modified_time.is_some()));
}

#[tokio::test]
async fn test_account_info() {
    let (server, store) = setup().await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": { "displayName": "Test User", "emailAddress": "test@example.com" },
            "storageQuota": { "limit": "16106127360", "usage": "1073741824" }
        })))
        .mount(&server)
        .await;

    let info = store.client().about().await.unwrap();
    assert_eq!(info.display_name, "Test User");
    assert_eq!(info.email, "test@example.com");
    assert_eq!(info.quota_used, 1_073_741_824);
    assert_eq!(info.quota_total, Some(16_106_127_360));
}
