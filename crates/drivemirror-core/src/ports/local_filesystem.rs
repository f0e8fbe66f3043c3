//! Local filesystem port (driven/secondary port)
//!
//! This module defines the read-only interface to the local directory tree
//! being mirrored: walking it, reading file metadata and content, and
//! hashing files.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because filesystem errors are adapter-specific.
//!   Callers turn a failure on one file into a recorded item error.
//! - The port never writes: a one-way mirror leaves local files untouched.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::newtypes::ContentHash;

// ============================================================================
// WalkEntry
// ============================================================================

/// One directory visited by [`ILocalFileSystem::walk`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Absolute path of the directory
    pub dir: PathBuf,
    /// Names of its subdirectories
    pub subdirs: Vec<String>,
    /// Names of its regular files
    pub files: Vec<String>,
}

impl WalkEntry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            subdirs: Vec::new(),
            files: Vec::new(),
        }
    }
}

// ============================================================================
// ILocalFileSystem trait
// ============================================================================

/// Port for read access to the local tree
#[async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Walks the tree under `root`, yielding one entry per directory
    ///
    /// The root itself is the first entry. Symbolic links are not followed.
    async fn walk(&self, root: &Path) -> anyhow::Result<Vec<WalkEntry>>;

    /// Last modification time of a file
    async fn file_mod_time(&self, path: &Path) -> anyhow::Result<DateTime<Utc>>;

    /// Reads the whole content of a file
    async fn read_file(&self, path: &Path) -> anyhow::Result<Vec<u8>>;

    /// Streams a file through the content hash
    async fn hash_file(&self, path: &Path) -> anyhow::Result<ContentHash>;

    /// Whether anything exists at `path`
    async fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is a directory
    async fn is_directory(&self, path: &Path) -> bool;

    /// Whether `path` is a regular file
    async fn is_file(&self, path: &Path) -> bool;

    /// Whether the current process can read `path`
    async fn is_readable(&self, path: &Path) -> bool;
}
