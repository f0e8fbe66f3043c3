//! File reconciliation for a single folder
//!
//! The [`FileReconciler`] lists a folder's remote files, partitions them
//! against the local files, and runs the resulting uploads, removals and
//! content checks with bounded concurrency.
//!
//! Item-scoped failures (a rejected upload, an unreadable local file) are
//! collected in the [`FolderOutcome`]. Any other failure stops the siblings
//! that have not started yet and is returned once in-flight work drains.

use std::sync::Arc;

use bytes::Bytes;
use drivemirror_core::domain::change::detect;
use drivemirror_core::domain::{
    partition_files, quick_check, LocalFile, RelativePath, RemoteId, RemoteNode, UpdateReason,
};
use drivemirror_core::ports::{ILocalFileSystem, IRemoteStore, RemoteError};
use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::result::{ItemError, SyncResult};
use crate::retry::{with_retry, RetryPolicy};
use crate::SyncError;

/// Counts and item errors produced for one folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderOutcome {
    pub files_created: u32,
    pub files_updated: u32,
    pub files_deleted: u32,
    pub errors: Vec<ItemError>,
}

impl FolderOutcome {
    /// Adds this folder's counts to the run summary
    pub fn merge_into(self, result: &mut SyncResult) {
        result.files_created += self.files_created;
        result.files_updated += self.files_updated;
        result.files_deleted += self.files_deleted;
        result.errors.extend(self.errors);
    }
}

/// One unit of per-file work
#[derive(Debug)]
enum FileAction {
    Upload(LocalFile),
    Remove(RemoteNode),
    Check(LocalFile, RemoteNode),
}

/// What happened to one file
#[derive(Debug)]
enum FileResult {
    Created,
    Updated,
    Deleted,
    Unchanged,
    Failed(ItemError),
}

/// Reconciles the files of one remote folder against its local counterpart
pub struct FileReconciler {
    remote: Arc<dyn IRemoteStore>,
    local_fs: Arc<dyn ILocalFileSystem>,
    retry: RetryPolicy,
    concurrency: usize,
}

impl FileReconciler {
    pub fn new(
        remote: Arc<dyn IRemoteStore>,
        local_fs: Arc<dyn ILocalFileSystem>,
        retry: RetryPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            remote,
            local_fs,
            retry,
            concurrency: concurrency.max(1),
        }
    }

    /// Brings the remote folder `folder_id` in line with `local_files`
    ///
    /// When `known_empty` is set the folder was created during this run and
    /// its remote listing is skipped.
    ///
    /// # Errors
    /// Returns the first run-aborting failure, or [`SyncError::Cancelled`].
    #[instrument(skip(self, local_files, cancel), fields(folder = %folder, files = local_files.len()))]
    pub async fn reconcile_folder(
        &self,
        folder: &RelativePath,
        folder_id: &RemoteId,
        local_files: &[LocalFile],
        known_empty: bool,
        cancel: &CancellationToken,
    ) -> Result<FolderOutcome, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let remote_files = if known_empty {
            Vec::new()
        } else {
            with_retry(&self.retry, "list_files", || self.remote.list_files(folder_id))
                .await
                .map_err(|e| SyncError::from_remote(format!("list_files({folder})"), e))?
        };

        let partition = partition_files(local_files, remote_files);
        debug!(
            to_upload = partition.to_upload.len(),
            to_remove = partition.to_remove.len(),
            to_check = partition.to_check.len(),
            "Folder partitioned"
        );

        let actions: Vec<FileAction> = partition
            .to_upload
            .into_iter()
            .map(FileAction::Upload)
            .chain(partition.to_remove.into_iter().map(FileAction::Remove))
            .chain(
                partition
                    .to_check
                    .into_iter()
                    .map(|(local, remote)| FileAction::Check(local, remote)),
            )
            .collect();

        let siblings = cancel.child_token();
        let mut results = stream::iter(actions.into_iter().map(|action| {
            let siblings = siblings.clone();
            async move {
                if siblings.is_cancelled() {
                    return None;
                }
                Some(self.run(folder, folder_id, action).await)
            }
        }))
        .buffer_unordered(self.concurrency);

        let mut outcome = FolderOutcome::default();
        let mut failure = None;
        while let Some(item) = results.next().await {
            match item {
                Some(Ok(FileResult::Created)) => outcome.files_created += 1,
                Some(Ok(FileResult::Updated)) => outcome.files_updated += 1,
                Some(Ok(FileResult::Deleted)) => outcome.files_deleted += 1,
                Some(Ok(FileResult::Unchanged)) | None => {}
                Some(Ok(FileResult::Failed(err))) => outcome.errors.push(err),
                Some(Err(err)) => {
                    siblings.cancel();
                    failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(outcome)
    }

    async fn run(
        &self,
        folder: &RelativePath,
        folder_id: &RemoteId,
        action: FileAction,
    ) -> Result<FileResult, SyncError> {
        match action {
            FileAction::Upload(local) => self.upload(folder, folder_id, &local).await,
            FileAction::Remove(remote) => self.remove(folder, &remote).await,
            FileAction::Check(local, remote) => self.check(folder, &local, &remote).await,
        }
    }

    async fn upload(
        &self,
        folder: &RelativePath,
        folder_id: &RemoteId,
        local: &LocalFile,
    ) -> Result<FileResult, SyncError> {
        let path = file_path(folder, &local.name);
        let content = match self.local_fs.read_file(&local.path).await {
            Ok(content) => Bytes::from(content),
            Err(e) => return Ok(local_failure(path, "read", &e)),
        };
        let mime = guess_mime(local);
        let bytes = content.len();

        let created = with_retry(&self.retry, "create_file", || {
            self.remote
                .create_file(&local.name, folder_id, content.clone(), &mime)
        })
        .await;

        match created {
            Ok(id) => {
                info!(op = "upload", path = %path, id = %id, bytes, "File uploaded");
                Ok(FileResult::Created)
            }
            Err(e) => remote_failure(path, "upload", e),
        }
    }

    async fn remove(&self, folder: &RelativePath, remote: &RemoteNode) -> Result<FileResult, SyncError> {
        let path = file_path(folder, &remote.name);
        let deleted =
            with_retry(&self.retry, "delete_node", || self.remote.delete_node(&remote.id)).await;

        match deleted {
            Ok(()) => {
                info!(op = "delete_file", path = %path, id = %remote.id, "Remote file deleted");
                Ok(FileResult::Deleted)
            }
            Err(e) => remote_failure(path, "delete_file", e),
        }
    }

    async fn check(
        &self,
        folder: &RelativePath,
        local: &LocalFile,
        remote: &RemoteNode,
    ) -> Result<FileResult, SyncError> {
        let path = file_path(folder, &local.name);
        let local_modified = match self.local_fs.file_mod_time(&local.path).await {
            Ok(modified) => modified,
            Err(e) => return Ok(local_failure(path, "stat", &e)),
        };
        let remote_hash = remote.content_hash.as_ref();

        let reason = match quick_check(local_modified, remote.modified_time, remote_hash) {
            Some(reason) => Some(reason),
            None => {
                let local_hash = match self.local_fs.hash_file(&local.path).await {
                    Ok(hash) => hash,
                    Err(e) => return Ok(local_failure(path, "hash", &e)),
                };
                detect(local_modified, remote.modified_time, &local_hash, remote_hash)
            }
        };

        let Some(reason) = reason else {
            debug!(path = %path, "File unchanged");
            return Ok(FileResult::Unchanged);
        };
        if reason == UpdateReason::RemoteHashMissing {
            debug!(
                path = %path,
                mime_type = remote.mime_type.as_deref().unwrap_or("unknown"),
                reason = %reason,
                "Remote file has no checksum"
            );
        }

        let content = match self.local_fs.read_file(&local.path).await {
            Ok(content) => Bytes::from(content),
            Err(e) => return Ok(local_failure(path, "read", &e)),
        };
        let mime = guess_mime(local);
        let bytes = content.len();

        let updated = with_retry(&self.retry, "update_file_content", || {
            self.remote
                .update_file_content(&remote.id, content.clone(), &mime)
        })
        .await;

        match updated {
            Ok(()) => {
                info!(op = "update", path = %path, id = %remote.id, reason = %reason, bytes, "File updated");
                Ok(FileResult::Updated)
            }
            Err(e) => remote_failure(path, "update", e),
        }
    }
}

fn file_path(folder: &RelativePath, name: &str) -> String {
    format!("{folder}{}{name}", RelativePath::SEPARATOR)
}

fn guess_mime(local: &LocalFile) -> String {
    mime_guess::from_path(&local.path)
        .first_or_octet_stream()
        .essence_str()
        .to_owned()
}

fn local_failure(path: String, operation: &str, err: &anyhow::Error) -> FileResult {
    warn!(path = %path, operation, error = %err, "Skipping unreadable local file");
    FileResult::Failed(ItemError::new(path, operation, format!("{err:#}")))
}

/// Records item-scoped rejections; everything else aborts the run
fn remote_failure(path: String, operation: &str, err: RemoteError) -> Result<FileResult, SyncError> {
    if err.is_item_scoped() {
        warn!(path = %path, operation, error = %err, "Remote store rejected item");
        Ok(FileResult::Failed(ItemError::new(path, operation, err.to_string())))
    } else {
        Err(SyncError::from_remote(format!("{operation}({path})"), err))
    }
}
