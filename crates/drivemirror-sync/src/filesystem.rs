//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] on top of `walkdir` and `tokio::fs`.
//!
//! ## Design Decisions
//!
//! - **Walk**: `walkdir` runs on a blocking thread and never follows
//!   symbolic links. Links are dropped from the listing, as are entries whose
//!   names are not valid UTF-8 (they cannot be named on the remote side).
//! - **Hash**: MD5, matching Drive's `md5Checksum`, computed by streaming the
//!   file in 64 KiB chunks so large files are never held in memory.
//! - **Read-only**: the adapter has no write operations at all.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use drivemirror_core::domain::newtypes::ContentHash;
use drivemirror_core::ports::local_filesystem::{ILocalFileSystem, WalkEntry};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

/// Read buffer size used while hashing
const HASH_CHUNK_SIZE: usize = 64 * 1024;

// ============================================================================
// LocalFileSystemAdapter struct
// ============================================================================

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem.
///
/// This is a zero-sized struct because all operations derive their context
/// from the path arguments.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    /// Create a new `LocalFileSystemAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Blocking walk, grouped by directory
fn walk_blocking(root: &Path) -> anyhow::Result<Vec<WalkEntry>> {
    let mut entries: BTreeMap<PathBuf, WalkEntry> = BTreeMap::new();
    entries.insert(root.to_path_buf(), WalkEntry::new(root));

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || entry.file_name().to_str().is_some() {
                return true;
            }
            warn!(
                path = %entry.path().display(),
                "Skipping entry with a non UTF-8 name"
            );
            false
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| root.display().to_string());
            anyhow::anyhow!("failed to walk {path}: {e}")
        })?;
        if entry.depth() == 0 {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let Some(parent) = entry.path().parent() else {
            continue;
        };
        let file_type = entry.file_type();

        if file_type.is_dir() {
            entries
                .entry(entry.path().to_path_buf())
                .or_insert_with(|| WalkEntry::new(entry.path()));
            entries
                .entry(parent.to_path_buf())
                .or_insert_with(|| WalkEntry::new(parent))
                .subdirs
                .push(name);
        } else if file_type.is_file() {
            entries
                .entry(parent.to_path_buf())
                .or_insert_with(|| WalkEntry::new(parent))
                .files
                .push(name);
        } else {
            debug!(path = %entry.path().display(), "Skipping symlink or special file");
        }
    }

    Ok(entries.into_values().collect())
}

// ============================================================================
// ILocalFileSystem implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystemAdapter {
    #[instrument(skip(self), fields(root = %root.display()))]
    async fn walk(&self, root: &Path) -> anyhow::Result<Vec<WalkEntry>> {
        let root = root.to_path_buf();
        let entries = tokio::task::spawn_blocking(move || walk_blocking(&root)).await??;
        debug!(directories = entries.len(), "walk complete");
        Ok(entries)
    }

    async fn file_mod_time(&self, path: &Path) -> anyhow::Result<DateTime<Utc>> {
        let modified = tokio::fs::metadata(path).await?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn read_file(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        let data = tokio::fs::read(path).await?;
        debug!(bytes = data.len(), "file read complete");
        Ok(data)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn hash_file(&self, path: &Path) -> anyhow::Result<ContentHash> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut context = md5::Context::new();
        let mut buffer = vec![0u8; HASH_CHUNK_SIZE];
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            context.consume(&buffer[..read]);
        }
        let hash = ContentHash::new(format!("{:x}", context.compute()))?;
        debug!(hash = %hash, "hash computed");
        Ok(hash)
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::symlink_metadata(path).await.is_ok()
    }

    async fn is_directory(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn is_file(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn is_readable(&self, path: &Path) -> bool {
        if self.is_directory(path).await {
            tokio::fs::read_dir(path).await.is_ok()
        } else {
            tokio::fs::File::open(path).await.is_ok()
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================
