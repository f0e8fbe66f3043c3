//! Per-run folder trees
//!
//! [`ParentIndex`] maps remote folders to their identifiers so the
//! orchestrator can resolve "create under parent X" without re-querying the
//! remote store. [`LocalTree`] is the normalized result of one local walk.
//!
//! ## Design Notes
//!
//! - Folders are keyed by full [`RelativePath`] and by the composite
//!   [`FolderKey`] `(parent id, name)`. Bare names are never keys: two
//!   folders named `shared` at different depths stay distinct.
//! - Both structures live for one run only and are rebuilt from scratch on
//!   every invocation.

use std::collections::{BTreeSet, HashMap};

use super::errors::DomainError;
use super::newtypes::{RelativePath, RemoteId};
use super::node::LocalFile;

// ============================================================================
// FolderKey
// ============================================================================

/// Identity of a folder among its siblings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderKey {
    /// Identifier of the enclosing folder
    pub parent: RemoteId,
    /// Folder name
    pub name: String,
}

impl FolderKey {
    pub fn new(parent: RemoteId, name: impl Into<String>) -> Self {
        Self {
            parent,
            name: name.into(),
        }
    }
}

// ============================================================================
// ParentIndex
// ============================================================================

/// Index of every remote folder known during a run
#[derive(Debug, Clone)]
pub struct ParentIndex {
    by_path: HashMap<RelativePath, RemoteId>,
    by_key: HashMap<FolderKey, RemoteId>,
}

impl ParentIndex {
    /// Creates an index containing only the sync root
    pub fn new(root_path: RelativePath, root_id: RemoteId) -> Self {
        let mut by_path = HashMap::new();
        by_path.insert(root_path, root_id);
        Self {
            by_path,
            by_key: HashMap::new(),
        }
    }

    /// Records a folder under `parent_id`
    ///
    /// # Errors
    /// Returns [`DomainError::DuplicateFolder`] if `path` or the
    /// `(parent_id, name)` pair is already indexed. On the remote side that
    /// means two sibling folders share a name, which cannot be mapped onto a
    /// local tree.
    pub fn insert(
        &mut self,
        path: RelativePath,
        parent_id: &RemoteId,
        id: RemoteId,
    ) -> Result<(), DomainError> {
        let key = FolderKey::new(parent_id.clone(), path.name());
        if self.by_path.contains_key(&path) || self.by_key.contains_key(&key) {
            return Err(DomainError::DuplicateFolder {
                path: path.to_string(),
            });
        }
        self.by_key.insert(key, id.clone());
        self.by_path.insert(path, id);
        Ok(())
    }

    /// Identifier of the folder at `path`
    #[must_use]
    pub fn get(&self, path: &RelativePath) -> Option<&RemoteId> {
        self.by_path.get(path)
    }

    /// Identifier of the folder at `path`, or an error naming the path
    ///
    /// # Errors
    /// Returns [`DomainError::UnresolvedFolder`] if the path is not indexed
    pub fn resolve(&self, path: &RelativePath) -> Result<&RemoteId, DomainError> {
        self.get(path)
            .ok_or_else(|| DomainError::UnresolvedFolder(path.to_string()))
    }

    /// Identifier of the child folder `name` under `parent`
    #[must_use]
    pub fn child(&self, parent: &RemoteId, name: &str) -> Option<&RemoteId> {
        self.by_key.get(&FolderKey::new(parent.clone(), name))
    }

    /// Identifier of the folder enclosing `path`
    #[must_use]
    pub fn parent_of(&self, path: &RelativePath) -> Option<&RemoteId> {
        path.parent().and_then(|parent| self.by_path.get(&parent))
    }

    /// Number of indexed folders, root included
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Always false: the root is indexed on construction
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

// ============================================================================
// LocalTree
// ============================================================================

/// Normalized view of a local directory tree
#[derive(Debug, Clone)]
pub struct LocalTree {
    root: RelativePath,
    folders: BTreeSet<RelativePath>,
    files: HashMap<RelativePath, Vec<LocalFile>>,
}

impl LocalTree {
    /// Creates an empty tree rooted at `root`
    pub fn new(root: RelativePath) -> Self {
        Self {
            root,
            folders: BTreeSet::new(),
            files: HashMap::new(),
        }
    }

    /// Records a subdirectory
    ///
    /// # Errors
    /// Returns an error if the path is the root, lies outside the root or
    /// was already recorded
    pub fn add_folder(&mut self, path: RelativePath) -> Result<(), DomainError> {
        if !path.is_descendant_of(&self.root) {
            return Err(DomainError::ForeignRoot {
                path: path.to_string(),
                root: self.root.to_string(),
            });
        }
        let rendered = path.to_string();
        if !self.folders.insert(path) {
            return Err(DomainError::DuplicateFolder { path: rendered });
        }
        Ok(())
    }

    /// Records the regular files of the folder at `path`
    pub fn set_files(&mut self, path: RelativePath, files: Vec<LocalFile>) {
        self.files.insert(path, files);
    }

    /// Files of the folder at `path`; empty if none were recorded
    #[must_use]
    pub fn files_in(&self, path: &RelativePath) -> &[LocalFile] {
        self.files.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Subdirectory paths, root excluded
    pub fn folders(&self) -> &BTreeSet<RelativePath> {
        &self.folders
    }

    pub fn root(&self) -> &RelativePath {
        &self.root
    }

    /// Total number of files across all folders
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}
