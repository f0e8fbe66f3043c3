//! Path normalization
//!
//! Turns both trees into sets of [`RelativePath`]s rooted at the sync root's
//! name, so that the differ can compare them directly.
//!
//! ## Design Notes
//!
//! - The remote walk is breadth-first. Folders of one depth level are listed
//!   concurrently, bounded by `list_concurrency`; results are folded into the
//!   [`ParentIndex`] by this task only.
//! - Folders are keyed by full path and by `(parent id, name)`. Two remote
//!   sibling folders with the same name cannot be mirrored and abort the run.
//! - A remote folder whose name is not a valid path segment (`.`, `..`, or
//!   containing `/`) can have no local counterpart. It is not descended into
//!   and is reported in [`RemoteTree::unmirrorable`] for removal.
//! - The local walk is delegated to [`ILocalFileSystem::walk`], which already
//!   drops symbolic links and non UTF-8 names.

use std::collections::BTreeSet;
use std::path::Path;

use drivemirror_core::domain::{LocalFile, LocalTree, ParentIndex, RelativePath, RemoteId};
use drivemirror_core::ports::{ILocalFileSystem, IRemoteStore};
use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::retry::{with_retry, RetryPolicy};
use crate::SyncError;

// ============================================================================
// Remote tree
// ============================================================================

/// Normalized view of the remote folder tree
#[derive(Debug, Clone)]
pub struct RemoteTree {
    /// Every descendant folder of the root, root excluded
    pub paths: BTreeSet<RelativePath>,
    /// Identifier lookup for every known folder, root included
    pub index: ParentIndex,
    /// Folders whose names cannot appear in a path, in walk order
    pub unmirrorable: Vec<UnmirrorableFolder>,
}

impl RemoteTree {
    /// A tree holding only its root, used when the root was just created
    pub fn empty(root_path: RelativePath, root_id: RemoteId) -> Self {
        Self {
            paths: BTreeSet::new(),
            index: ParentIndex::new(root_path, root_id),
            unmirrorable: Vec::new(),
        }
    }
}

/// A remote folder that no local directory can correspond to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmirrorableFolder {
    /// Path of the enclosing folder
    pub parent: RelativePath,
    pub id: RemoteId,
    pub name: String,
}

impl UnmirrorableFolder {
    /// `parent/name` as shown in logs and item errors
    pub fn label(&self) -> String {
        format!("{}{}{}", self.parent, RelativePath::SEPARATOR, self.name)
    }
}

/// Walks the remote folder tree below `root_id`
///
/// Files are not listed here; only folders take part in the structural diff.
///
/// # Errors
/// - [`SyncError::Remote`] / [`SyncError::Auth`] if a listing fails for good
/// - [`SyncError::Plan`] if two sibling folders share a name
/// - [`SyncError::Cancelled`] if `cancel` fires during the walk
#[instrument(skip(store, retry, cancel), fields(root = %root_path))]
pub async fn remote_tree_paths(
    store: &dyn IRemoteStore,
    root_path: &RelativePath,
    root_id: &RemoteId,
    concurrency: usize,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<RemoteTree, SyncError> {
    let mut tree = RemoteTree::empty(root_path.clone(), root_id.clone());
    let mut level = vec![(root_path.clone(), root_id.clone())];
    let mut depth = 0usize;

    while !level.is_empty() {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        debug!(depth, folders = level.len(), "Listing folder level");

        let siblings = cancel.child_token();
        let mut listings = stream::iter(level.into_iter().map(|(path, id)| {
            let siblings = siblings.clone();
            async move {
                if siblings.is_cancelled() {
                    return None;
                }
                let children =
                    with_retry(retry, "list_child_folders", || store.list_child_folders(&id)).await;
                Some((path, id, children))
            }
        }))
        .buffer_unordered(concurrency.max(1));

        let mut listed = Vec::new();
        let mut failure = None;
        while let Some(item) = listings.next().await {
            match item {
                Some((path, id, Ok(children))) => listed.push((path, id, children)),
                Some((path, _, Err(err))) => {
                    siblings.cancel();
                    if failure.is_none() {
                        failure = Some(SyncError::from_remote(
                            format!("list_child_folders({path})"),
                            err,
                        ));
                    }
                }
                None => {}
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        // Deterministic insertion order, so duplicate reports are stable
        listed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut next = Vec::new();
        for (parent_path, parent_id, mut children) in listed {
            children.retain(|child| child.is_folder());
            children.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
            for child in children {
                let path = match parent_path.join(&child.name) {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(
                            parent = %parent_path,
                            name = %child.name,
                            id = %child.id,
                            error = %e,
                            "Remote folder name cannot be mirrored"
                        );
                        tree.unmirrorable.push(UnmirrorableFolder {
                            parent: parent_path.clone(),
                            id: child.id,
                            name: child.name,
                        });
                        continue;
                    }
                };
                tree.index.insert(path.clone(), &parent_id, child.id.clone())?;
                tree.paths.insert(path.clone());
                next.push((path, child.id));
            }
        }

        level = next;
        depth += 1;
    }

    info!(
        folders = tree.paths.len(),
        unmirrorable = tree.unmirrorable.len(),
        "Remote tree built"
    );
    Ok(tree)
}

// ============================================================================
// Local tree
// ============================================================================

/// Name of the sync root as used on the remote side
///
/// # Errors
/// Returns [`SyncError::Config`] if the directory has no usable name
pub fn root_name(root_dir: &Path) -> Result<&str, SyncError> {
    root_dir
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            SyncError::Config(format!(
                "{} has no UTF-8 directory name to use as the remote root",
                root_dir.display()
            ))
        })
}

/// Walks the local tree under `root_dir`
///
/// # Errors
/// - [`SyncError::LocalIo`] if any part of the tree cannot be read
/// - [`SyncError::Plan`] if a directory name cannot be part of a path
#[instrument(skip(fs), fields(root = %root_dir.display()))]
pub async fn local_tree_paths(
    fs: &dyn ILocalFileSystem,
    root_dir: &Path,
) -> Result<LocalTree, SyncError> {
    let root = RelativePath::root(root_name(root_dir)?)?;
    let entries = fs.walk(root_dir).await.map_err(|e| SyncError::LocalIo {
        path: root_dir.to_path_buf(),
        message: format!("{e:#}"),
    })?;

    let mut tree = LocalTree::new(root.clone());
    for entry in entries {
        let relative = entry
            .dir
            .strip_prefix(root_dir)
            .map_err(|_| SyncError::LocalIo {
                path: entry.dir.clone(),
                message: "walk returned a directory outside the root".to_string(),
            })?;

        let mut path = root.clone();
        for component in relative.components() {
            let name = component
                .as_os_str()
                .to_str()
                .ok_or_else(|| SyncError::LocalIo {
                    path: entry.dir.clone(),
                    message: "directory name is not valid UTF-8".to_string(),
                })?;
            path = path.join(name)?;
        }

        if !path.is_root() {
            tree.add_folder(path.clone())?;
        }
        let files = entry
            .files
            .iter()
            .map(|name| LocalFile::new(name.as_str(), entry.dir.join(name)))
            .collect();
        tree.set_files(path, files);
    }

    info!(
        folders = tree.folders().len(),
        files = tree.file_count(),
        "Local tree built"
    );
    Ok(tree)
}
