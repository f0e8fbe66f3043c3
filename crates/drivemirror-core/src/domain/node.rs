//! Tree node types
//!
//! [`RemoteNode`] describes an entry returned by the remote store: a named
//! node with an identifier and a single parent reference. [`LocalFile`] is
//! the local counterpart used by the file reconciler; local folders are
//! represented only by their [`RelativePath`](super::RelativePath).

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{ContentHash, RemoteId};

/// Kind of a tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    File,
}

/// A node of the remote tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Remote identifier
    pub id: RemoteId,
    /// Name, unique among siblings of the same kind in a well-formed tree
    pub name: String,
    /// Folder or file
    pub kind: NodeKind,
    /// Identifier of the enclosing folder, if reported
    pub parent_id: Option<RemoteId>,
    /// Content type reported by the store (files only)
    pub mime_type: Option<String>,
    /// Last modification time as recorded by the store (files only)
    pub modified_time: Option<DateTime<Utc>>,
    /// Content hash, absent for file types the store does not checksum
    pub content_hash: Option<ContentHash>,
}

impl RemoteNode {
    /// Creates a folder node
    pub fn folder(id: RemoteId, name: impl Into<String>, parent_id: Option<RemoteId>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: NodeKind::Folder,
            parent_id,
            mime_type: None,
            modified_time: None,
            content_hash: None,
        }
    }

    /// Creates a file node without metadata
    pub fn file(id: RemoteId, name: impl Into<String>, parent_id: Option<RemoteId>) -> Self {
        Self {
            kind: NodeKind::File,
            ..Self::folder(id, name, parent_id)
        }
    }

    /// Sets the modification time
    #[must_use]
    pub fn with_modified_time(mut self, modified: DateTime<Utc>) -> Self {
        self.modified_time = Some(modified);
        self
    }

    /// Sets the content hash
    #[must_use]
    pub fn with_content_hash(mut self, hash: ContentHash) -> Self {
        self.content_hash = Some(hash);
        self
    }

    /// Sets the content type
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Whether this node is a folder
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }
}

/// A regular file found by the local walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// File name within its directory
    pub name: String,
    /// Absolute path on disk
    pub path: PathBuf,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}
