//! Sync orchestrator
//!
//! The [`SyncEngine`] mirrors one local directory tree onto the remote store.
//! Local files are never modified.
//!
//! ## Sync Flow
//!
//! 1. **Preflight**: the local root must be an existing, readable directory
//! 2. **EnsureRootFolder**: find the remote folder named after the local
//!    root, creating it at the top level if missing
//! 3. **BuildRemoteTree / BuildLocalTree**: normalize both trees
//! 4. **DiffFolders**: compute folders to create, delete, and reconcile
//! 5. **CreateFolders**: shallow first, one at a time
//! 6. **UploadNewFolderContents**: upload files into freshly created folders
//! 7. **ReconcileCommonFolderFiles**: upload, update or delete files of the
//!    folders present on both sides
//! 8. **DeleteObsoleteFolders**: deepest first, files before their folder.
//!    Remote folders whose names cannot be local path segments are removed
//!    here too, subtree included
//!
//! ## Retry Logic
//!
//! Transient errors (network, rate limiting, server errors) are retried with
//! exponential backoff, see [`crate::retry`]. Any other failure aborts the
//! run, except rejections of a single item, which are recorded in
//! [`SyncResult::errors`].

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use drivemirror_core::config::Config;
use drivemirror_core::domain::{diff, DomainError, RelativePath, RemoteId, SyncPlan};
use drivemirror_core::ports::{ILocalFileSystem, IRemoteStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::normalizer::{local_tree_paths, remote_tree_paths, root_name, RemoteTree, UnmirrorableFolder};
use crate::reconciler::FileReconciler;
use crate::result::{ItemError, SyncResult};
use crate::retry::{with_retry, RetryPolicy};
use crate::SyncError;

// ============================================================================
// SyncPhase
// ============================================================================

/// Phases of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Preflight,
    EnsureRootFolder,
    BuildRemoteTree,
    BuildLocalTree,
    DiffFolders,
    CreateFolders,
    UploadNewFolderContents,
    ReconcileCommonFolderFiles,
    DeleteObsoleteFolders,
    Done,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::EnsureRootFolder => "ensure_root_folder",
            Self::BuildRemoteTree => "build_remote_tree",
            Self::BuildLocalTree => "build_local_tree",
            Self::DiffFolders => "diff_folders",
            Self::CreateFolders => "create_folders",
            Self::UploadNewFolderContents => "upload_new_folder_contents",
            Self::ReconcileCommonFolderFiles => "reconcile_common_folder_files",
            Self::DeleteObsoleteFolders => "delete_obsolete_folders",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SyncOptions
// ============================================================================

/// Tuning knobs of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Concurrent folder listings per level of the remote walk
    pub list_concurrency: usize,
    /// Concurrent file operations within one folder
    pub upload_concurrency: usize,
    /// Backoff for transient remote failures
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            list_concurrency: 8,
            upload_concurrency: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            list_concurrency: config.sync.list_concurrency,
            upload_concurrency: config.sync.upload_concurrency,
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// One-way mirroring engine
///
/// ## Dependencies
///
/// - `remote`: the remote store (Google Drive in production)
/// - `local_fs`: read access to the local tree
pub struct SyncEngine {
    remote: Arc<dyn IRemoteStore>,
    local_fs: Arc<dyn ILocalFileSystem>,
    options: SyncOptions,
    cancel: CancellationToken,
}

impl SyncEngine {
    /// Creates an engine configured from the application [`Config`]
    pub fn new(
        remote: Arc<dyn IRemoteStore>,
        local_fs: Arc<dyn ILocalFileSystem>,
        config: &Config,
    ) -> Self {
        Self::with_options(remote, local_fs, SyncOptions::from_config(config))
    }

    pub fn with_options(
        remote: Arc<dyn IRemoteStore>,
        local_fs: Arc<dyn ILocalFileSystem>,
        options: SyncOptions,
    ) -> Self {
        Self {
            remote,
            local_fs,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the engine's cancellation token
    ///
    /// Cancelling the token stops the run before its next remote call; the
    /// run then ends with [`SyncError::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    // ========================================================================
    // SyncEngine::sync()
    // ========================================================================

    /// Mirrors `local_root` onto the remote store
    ///
    /// # Returns
    /// A [`SyncResult`] with the mutation counts and item-scoped errors
    ///
    /// # Errors
    /// Returns a [`SyncError`] for any failure that aborts the run. Mutations
    /// applied before the failure are kept and logged.
    #[instrument(skip(self), fields(local_root = %local_root.display()))]
    pub async fn sync(&self, local_root: &Path) -> Result<SyncResult, SyncError> {
        let start = Instant::now();
        let mut result = SyncResult::default();

        let outcome = self.run(local_root, &mut result).await;
        result.duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                info!(
                    phase = %SyncPhase::Done,
                    folders_created = result.folders_created,
                    folders_deleted = result.folders_deleted,
                    files_created = result.files_created,
                    files_updated = result.files_updated,
                    files_deleted = result.files_deleted,
                    errors = result.errors.len(),
                    duration_ms = result.duration_ms,
                    "Sync completed"
                );
                Ok(result)
            }
            Err(err) => {
                if matches!(err, SyncError::Cancelled) {
                    warn!(
                        mutations = result.total_mutations(),
                        errors = result.errors.len(),
                        duration_ms = result.duration_ms,
                        "Sync cancelled"
                    );
                } else {
                    error!(
                        error = %err,
                        mutations = result.total_mutations(),
                        errors = result.errors.len(),
                        duration_ms = result.duration_ms,
                        "Sync aborted"
                    );
                }
                Err(err)
            }
        }
    }

    async fn run(&self, local_root: &Path, result: &mut SyncResult) -> Result<(), SyncError> {
        enter(SyncPhase::Preflight);
        let root = self.preflight(local_root).await?;

        enter(SyncPhase::EnsureRootFolder);
        let (root_id, root_created) = self.ensure_root_folder(&root).await?;
        if root_created {
            result.folders_created += 1;
        }

        enter(SyncPhase::BuildRemoteTree);
        let RemoteTree {
            paths: remote_paths,
            mut index,
            unmirrorable,
        } = if root_created {
            RemoteTree::empty(root.clone(), root_id.clone())
        } else {
            remote_tree_paths(
                self.remote.as_ref(),
                &root,
                &root_id,
                self.options.list_concurrency,
                &self.options.retry,
                &self.cancel,
            )
            .await?
        };

        enter(SyncPhase::BuildLocalTree);
        let local = local_tree_paths(self.local_fs.as_ref(), local_root).await?;

        enter(SyncPhase::DiffFolders);
        let plan = diff(&root, &remote_paths, local.folders())?;
        info!(
            to_create = plan.to_create.len(),
            to_delete = plan.to_delete.len(),
            common = plan.common.len(),
            "Folder plan computed"
        );

        enter(SyncPhase::CreateFolders);
        let mut fresh: HashSet<RelativePath> = HashSet::new();
        if root_created {
            fresh.insert(root.clone());
        }
        let mut rejected: Vec<RelativePath> = Vec::new();
        for path in &plan.to_create {
            self.check_cancelled()?;
            if rejected.iter().any(|r| path.is_descendant_of(r)) {
                debug!(path = %path, "Skipping folder below a rejected folder");
                continue;
            }
            let parent_id = index
                .parent_of(path)
                .cloned()
                .ok_or_else(|| DomainError::UnresolvedFolder(path.to_string()))?;
            let created = with_retry(&self.options.retry, "create_folder", || {
                self.remote.create_folder(path.name(), &parent_id)
            })
            .await;
            match created {
                Ok(id) => {
                    info!(op = "create_folder", path = %path, id = %id, "Folder created");
                    index.insert(path.clone(), &parent_id, id)?;
                    fresh.insert(path.clone());
                    result.folders_created += 1;
                }
                Err(err) if err.is_item_scoped() => {
                    warn!(path = %path, error = %err, "Folder creation rejected; skipping its subtree");
                    result
                        .errors
                        .push(ItemError::new(path.as_str(), "create_folder", err.to_string()));
                    rejected.push(path.clone());
                }
                Err(err) => {
                    return Err(SyncError::from_remote(format!("create_folder({path})"), err));
                }
            }
        }

        let reconciler = FileReconciler::new(
            Arc::clone(&self.remote),
            Arc::clone(&self.local_fs),
            self.options.retry,
            self.options.upload_concurrency,
        );

        enter(SyncPhase::UploadNewFolderContents);
        for path in plan.to_create.iter().filter(|p| fresh.contains(*p)) {
            let folder_id = index.resolve(path)?;
            reconciler
                .reconcile_folder(path, folder_id, local.files_in(path), true, &self.cancel)
                .await?
                .merge_into(result);
        }

        enter(SyncPhase::ReconcileCommonFolderFiles);
        for path in &plan.common {
            let folder_id = index.resolve(path)?;
            reconciler
                .reconcile_folder(
                    path,
                    folder_id,
                    local.files_in(path),
                    fresh.contains(path),
                    &self.cancel,
                )
                .await?
                .merge_into(result);
        }

        enter(SyncPhase::DeleteObsoleteFolders);
        for folder in &unmirrorable {
            self.purge_unmirrorable(folder, result).await?;
        }
        for path in &plan.to_delete {
            self.check_cancelled()?;
            let folder_id = index.resolve(path)?.clone();

            // Empty the folder first; files count as deleted files
            reconciler
                .reconcile_folder(path, &folder_id, &[], false, &self.cancel)
                .await?
                .merge_into(result);

            self.check_cancelled()?;
            let deleted = with_retry(&self.options.retry, "delete_node", || {
                self.remote.delete_node(&folder_id)
            })
            .await;
            match deleted {
                Ok(()) => {
                    info!(op = "delete_folder", path = %path, id = %folder_id, "Folder deleted");
                    result.folders_deleted += 1;
                }
                Err(err) if err.is_item_scoped() => {
                    warn!(path = %path, error = %err, "Folder deletion rejected");
                    result
                        .errors
                        .push(ItemError::new(path.as_str(), "delete_folder", err.to_string()));
                }
                Err(err) => {
                    return Err(SyncError::from_remote(format!("delete_folder({path})"), err));
                }
            }
        }

        Ok(())
    }

    // ========================================================================
    // SyncEngine::plan()
    // ========================================================================

    /// Computes the folder plan without mutating anything
    ///
    /// A missing remote root yields a plan that creates every local folder.
    #[instrument(skip(self), fields(local_root = %local_root.display()))]
    pub async fn plan(&self, local_root: &Path) -> Result<SyncPlan, SyncError> {
        let root = self.preflight(local_root).await?;

        let remote_paths = match self.find_root(&root).await? {
            Some(root_id) => {
                let tree = remote_tree_paths(
                    self.remote.as_ref(),
                    &root,
                    &root_id,
                    self.options.list_concurrency,
                    &self.options.retry,
                    &self.cancel,
                )
                .await?;
                for folder in &tree.unmirrorable {
                    warn!(folder = %folder.label(), "A sync would delete this folder");
                }
                tree.paths
            }
            None => {
                info!(root = %root, "Remote root folder does not exist yet");
                Default::default()
            }
        };
        let local = local_tree_paths(self.local_fs.as_ref(), local_root).await?;

        Ok(diff(&root, &remote_paths, local.folders())?)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Validates the local root before any remote call
    async fn preflight(&self, local_root: &Path) -> Result<RelativePath, SyncError> {
        let display = local_root.display();
        if !self.local_fs.exists(local_root).await {
            return Err(SyncError::Config(format!("local folder {display} does not exist")));
        }
        if !self.local_fs.is_directory(local_root).await {
            return Err(SyncError::Config(format!("{display} is not a directory")));
        }
        if !self.local_fs.is_readable(local_root).await {
            return Err(SyncError::Config(format!("{display} is not readable")));
        }
        let name = root_name(local_root)?;
        RelativePath::root(name)
            .map_err(|e| SyncError::Config(format!("unusable root folder name: {e}")))
    }

    async fn find_root(&self, root: &RelativePath) -> Result<Option<RemoteId>, SyncError> {
        self.check_cancelled()?;
        with_retry(&self.options.retry, "find_root_folder", || {
            self.remote.find_root_folder(root.root_name())
        })
        .await
        .map_err(|e| SyncError::from_remote("find_root_folder", e))
    }

    /// Returns the root's identifier and whether it was created by this run
    async fn ensure_root_folder(&self, root: &RelativePath) -> Result<(RemoteId, bool), SyncError> {
        if let Some(id) = self.find_root(root).await? {
            debug!(root = %root, id = %id, "Remote root folder found");
            return Ok((id, false));
        }

        self.check_cancelled()?;
        let drive_root = RemoteId::drive_root();
        let id = with_retry(&self.options.retry, "create_folder", || {
            self.remote.create_folder(root.root_name(), &drive_root)
        })
        .await
        .map_err(|e| SyncError::from_remote(format!("create_folder({root})"), e))?;
        info!(op = "create_folder", path = %root, id = %id, "Remote root folder created");
        Ok((id, true))
    }

    /// Deletes a folder that cannot be mirrored, with everything below it
    ///
    /// Its subtree is listed level by level, then emptied and deleted
    /// deepest first. Names below it are kept verbatim in labels.
    async fn purge_unmirrorable(
        &self,
        folder: &UnmirrorableFolder,
        result: &mut SyncResult,
    ) -> Result<(), SyncError> {
        let mut levels = vec![vec![(folder.label(), folder.id.clone())]];
        loop {
            let mut next = Vec::new();
            for (label, id) in levels.last().into_iter().flatten() {
                self.check_cancelled()?;
                let children = with_retry(&self.options.retry, "list_child_folders", || {
                    self.remote.list_child_folders(id)
                })
                .await
                .map_err(|e| SyncError::from_remote(format!("list_child_folders({label})"), e))?;
                next.extend(
                    children
                        .into_iter()
                        .filter(|child| child.is_folder())
                        .map(|child| (format!("{label}/{}", child.name), child.id)),
                );
            }
            if next.is_empty() {
                break;
            }
            levels.push(next);
        }

        for (label, id) in levels.iter().rev().flatten() {
            self.check_cancelled()?;
            let files = with_retry(&self.options.retry, "list_files", || self.remote.list_files(id))
                .await
                .map_err(|e| SyncError::from_remote(format!("list_files({label})"), e))?;
            for file in files.iter().filter(|f| !f.is_folder()) {
                let file_label = format!("{label}/{}", file.name);
                if self.delete_item(&file_label, &file.id, "delete_file", result).await? {
                    result.files_deleted += 1;
                }
            }
            if self.delete_item(label, id, "delete_folder", result).await? {
                result.folders_deleted += 1;
            }
        }
        Ok(())
    }

    /// Deletes one node; an item-scoped refusal is recorded and yields `false`
    async fn delete_item(
        &self,
        label: &str,
        id: &RemoteId,
        operation: &str,
        result: &mut SyncResult,
    ) -> Result<bool, SyncError> {
        self.check_cancelled()?;
        let deleted = with_retry(&self.options.retry, "delete_node", || self.remote.delete_node(id)).await;
        match deleted {
            Ok(()) => {
                info!(op = operation, path = %label, id = %id, "Unmirrorable node deleted");
                Ok(true)
            }
            Err(err) if err.is_item_scoped() => {
                warn!(path = %label, error = %err, "Deletion rejected");
                result.errors.push(ItemError::new(label, operation, err.to_string()));
                Ok(false)
            }
            Err(err) => Err(SyncError::from_remote(format!("{operation}({label})"), err)),
        }
    }

    fn check_cancelled(&self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn enter(phase: SyncPhase) {
    info!(phase = %phase, "Entering phase");
}
