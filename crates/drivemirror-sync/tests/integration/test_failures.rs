//! Error handling during a run
//!
//! Covers item-scoped rejections, run-aborting failures, retries,
//! cancellation, and trees that cannot be mirrored.

use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use drivemirror_core::domain::{ContentHash, DomainError, RemoteId};
use drivemirror_core::ports::{ILocalFileSystem, IRemoteStore, RemoteError, WalkEntry};
use drivemirror_sync::filesystem::LocalFileSystemAdapter;
use drivemirror_sync::{SyncEngine, SyncError};
use tokio_util::sync::CancellationToken;

use crate::common::{engine, test_options, LocalDir, MemoryRemoteStore};

/// Local filesystem on which one file disappears after the walk
struct VanishingFile {
    inner: LocalFileSystemAdapter,
    name: &'static str,
}

impl VanishingFile {
    fn engine(store: &Arc<MemoryRemoteStore>, name: &'static str) -> SyncEngine {
        let remote: Arc<dyn IRemoteStore> = store.clone();
        let local = Arc::new(Self {
            inner: LocalFileSystemAdapter::new(),
            name,
        });
        SyncEngine::with_options(remote, local, test_options())
    }

    fn check(&self, path: &Path) -> anyhow::Result<()> {
        if path.file_name().is_some_and(|n| n == self.name) {
            return Err(anyhow!("vanished"));
        }
        Ok(())
    }
}

#[async_trait]
impl ILocalFileSystem for VanishingFile {
    async fn walk(&self, root: &Path) -> anyhow::Result<Vec<WalkEntry>> {
        self.inner.walk(root).await
    }
    async fn file_mod_time(&self, path: &Path) -> anyhow::Result<DateTime<Utc>> {
        self.inner.file_mod_time(path).await
    }
    async fn read_file(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        self.check(path)?;
        self.inner.read_file(path).await
    }
    async fn hash_file(&self, path: &Path) -> anyhow::Result<ContentHash> {
        self.check(path)?;
        self.inner.hash_file(path).await
    }
    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }
    async fn is_directory(&self, path: &Path) -> bool {
        self.inner.is_directory(path).await
    }
    async fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path).await
    }
    async fn is_readable(&self, path: &Path) -> bool {
        self.inner.is_readable(path).await
    }
}

#[tokio::test]
async fn test_rejected_upload_is_recorded_and_run_continues() {
    let local = LocalDir::new();
    local.write("bad.bin", b"bad");
    local.write("good.txt", b"good");
    let store = MemoryRemoteStore::new();
    store.fail_on("create_file", "bad.bin", RemoteError::Rejected("file too large".into()));

    let result = engine(&store).sync(local.path()).await.unwrap();

    assert_eq!(result.files_created, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, "proj/bad.bin");
    assert_eq!(result.errors[0].operation, "upload");
    assert!(store.exists("proj/good.txt"));
    assert!(!store.exists("proj/bad.bin"));
}

#[tokio::test]
async fn test_unreadable_file_is_recorded_and_run_continues() {
    let local = LocalDir::new();
    local.write("gone.txt", b"soon gone");
    local.write("kept.txt", b"kept");
    local.write("sub/also.txt", b"also");
    let store = MemoryRemoteStore::new();

    let result = VanishingFile::engine(&store, "gone.txt")
        .sync(local.path())
        .await
        .unwrap();

    assert_eq!(result.files_created, 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, "proj/gone.txt");
    assert_eq!(result.errors[0].operation, "read");
    assert!(result.errors[0].message.contains("vanished"));
    assert!(store.exists("proj/kept.txt"));
    assert!(store.exists("proj/sub/also.txt"));
    assert!(!store.exists("proj/gone.txt"));
    assert_eq!(store.calls("create_file"), 2);
}

#[tokio::test]
async fn test_unhashable_file_is_left_as_is() {
    let local = LocalDir::new();
    local.write("gone.txt", b"local edit");
    let store = MemoryRemoteStore::new();
    let root = store.seed_folder(&RemoteId::drive_root(), "proj");
    // Remote is newer, so only the hash comparison can flag the file
    store.seed_file(&root, "gone.txt", b"remote", Utc::now() + Duration::days(1));

    let result = VanishingFile::engine(&store, "gone.txt")
        .sync(local.path())
        .await
        .unwrap();

    assert_eq!(result.files_updated, 0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, "proj/gone.txt");
    assert_eq!(result.errors[0].operation, "hash");
    assert_eq!(store.content("proj/gone.txt").unwrap(), b"remote");
}

#[tokio::test]
async fn test_rejected_folder_skips_its_subtree() {
    let local = LocalDir::new();
    local.write("blocked/inner/a.txt", b"a");
    local.write("fine/b.txt", b"b");
    let store = MemoryRemoteStore::new();
    store.fail_on("create_folder", "blocked", RemoteError::Rejected("bad name".into()));

    let result = engine(&store).sync(local.path()).await.unwrap();

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].operation, "create_folder");
    // proj and fine only
    assert_eq!(result.folders_created, 2);
    assert_eq!(result.files_created, 1);
    assert_eq!(store.calls("create_folder"), 3);
    assert!(store.exists("proj/fine/b.txt"));
    assert!(!store.exists("proj/blocked"));
}

#[tokio::test]
async fn test_quota_exceeded_aborts_the_run() {
    let local = LocalDir::new();
    local.write("a.txt", b"a");
    let store = MemoryRemoteStore::new();
    store.fail_on("create_file", "a.txt", RemoteError::QuotaExceeded("storage full".into()));

    let err = engine(&store).sync(local.path()).await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::Remote {
            source: RemoteError::QuotaExceeded(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_auth_failure_is_reported_as_auth() {
    let local = LocalDir::new();
    let store = MemoryRemoteStore::new();
    store.fail_on("find_root_folder", "proj", RemoteError::Auth("token expired".into()));

    let err = engine(&store).sync(local.path()).await.unwrap_err();

    assert!(matches!(err, SyncError::Auth(_)));
    assert_eq!(store.mutations(), 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let local = LocalDir::new();
    local.write("a.txt", b"a");
    let store = MemoryRemoteStore::new();
    store.fail_transiently("create_file", 2);

    let result = engine(&store).sync(local.path()).await.unwrap();

    assert_eq!(result.files_created, 1);
    assert_eq!(store.calls("create_file"), 3);
}

#[tokio::test]
async fn test_exhausted_retries_abort_the_run() {
    let local = LocalDir::new();
    let store = MemoryRemoteStore::new();
    store.fail_transiently("find_root_folder", 10);

    let err = engine(&store).sync(local.path()).await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::Remote {
            source: RemoteError::Transient { .. },
            ..
        }
    ));
    // first attempt plus two retries
    assert_eq!(store.calls("find_root_folder"), 3);
}

#[tokio::test]
async fn test_duplicate_remote_folders_abort_before_mutation() {
    let local = LocalDir::new();
    local.write("a.txt", b"a");
    let store = MemoryRemoteStore::new();
    let root = store.seed_folder(&RemoteId::drive_root(), "proj");
    store.seed_folder(&root, "twin");
    store.seed_folder(&root, "twin");

    let err = engine(&store).sync(local.path()).await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::Plan(DomainError::DuplicateFolder { ref path }) if path == "proj/twin"
    ));
    assert_eq!(store.mutations(), 0);
}

#[tokio::test]
async fn test_cancelled_run_performs_no_mutation() {
    let local = LocalDir::new();
    local.write("a.txt", b"a");
    let store = MemoryRemoteStore::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine(&store)
        .with_cancellation(cancel)
        .sync(local.path())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(store.mutations(), 0);
}

#[tokio::test]
async fn test_missing_local_root_fails_before_remote_calls() {
    let local = LocalDir::new();
    let store = MemoryRemoteStore::new();

    let err = engine(&store)
        .sync(&local.path().join("does-not-exist"))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Config(_)));
    assert_eq!(store.calls("find_root_folder"), 0);
}

#[tokio::test]
async fn test_file_as_local_root_is_a_config_error() {
    let local = LocalDir::new();
    let file = local.write("plain.txt", b"x");
    let store = MemoryRemoteStore::new();

    let err = engine(&store).sync(&file).await.unwrap_err();

    assert!(matches!(err, SyncError::Config(_)));
}

#[tokio::test]
async fn test_rejected_file_delete_is_recorded() {
    let local = LocalDir::new();
    let store = MemoryRemoteStore::new();
    let root = store.seed_folder(&RemoteId::drive_root(), "proj");
    store.seed_file(&root, "locked.txt", b"l", Utc::now());
    store.fail_on("delete_node", "locked.txt", RemoteError::Rejected("locked".into()));

    let result = engine(&store).sync(local.path()).await.unwrap();

    assert_eq!(result.files_deleted, 0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].operation, "delete_file");
    assert!(store.exists("proj/locked.txt"));
}

#[tokio::test]
async fn test_rejected_delete_inside_unmirrorable_folder_is_recorded() {
    let local = LocalDir::new();
    let store = MemoryRemoteStore::new();
    let root = store.seed_folder(&RemoteId::drive_root(), "proj");
    let slashed = store.seed_folder(&root, "a/b");
    let inner = store.seed_folder(&slashed, "inner");
    store.seed_file(&inner, "held.txt", b"h", Utc::now());
    store.fail_on("delete_node", "held.txt", RemoteError::Rejected("on hold".into()));

    let result = engine(&store).sync(local.path()).await.unwrap();

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, "proj/a/b/inner/held.txt");
    assert_eq!(result.errors[0].operation, "delete_file");
    assert_eq!(result.folders_deleted, 2);
    assert!(store.children("proj").is_empty());
}
