//! Remote store port (driven/secondary port)
//!
//! This module defines the interface to a hierarchical remote file store
//! that exposes a parent-referencing tree of named nodes. Google Drive is
//! the production implementation; tests use an in-memory store.
//!
//! ## Design Notes
//!
//! - Uses a typed [`RemoteError`] rather than `anyhow::Result`: the
//!   orchestrator must tell retryable failures from run-aborting ones and
//!   from failures scoped to a single item.
//! - All operations are async because they involve network I/O.
//! - The trait requires `Send + Sync` so it can be shared through
//!   `Arc<dyn IRemoteStore>` and called concurrently.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::domain::newtypes::RemoteId;
use crate::domain::node::RemoteNode;

// ============================================================================
// RemoteError
// ============================================================================

/// Failure of a remote store operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Rate limiting or a network blip; the call may succeed if retried
    #[error("Transient remote failure: {message}")]
    Transient {
        /// Description of the failure
        message: String,
        /// Minimum wait requested by the server, if any
        retry_after: Option<Duration>,
    },

    /// Credentials are missing, invalid or expired
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The account may not perform the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The account ran out of storage
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A node the caller expected to exist is gone
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store refused this particular item (bad name, oversized file, ...)
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Any other failure that retrying will not fix
    #[error("Remote failure: {0}")]
    Fatal(String),
}

impl RemoteError {
    /// Creates a transient error without a server-provided delay
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Whether retrying the same call may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether the failure concerns only the item being processed
    ///
    /// Item-scoped failures are recorded and the run continues; every other
    /// non-transient failure aborts the run.
    #[must_use]
    pub fn is_item_scoped(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Server-provided minimum wait before retrying
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

// ============================================================================
// IRemoteStore trait
// ============================================================================

/// Port for a parent-linked remote file store
///
/// Listing operations return only non-trashed nodes that are direct
/// children of the given parent.
#[async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Finds the folder called `name` at the top level of the store
    ///
    /// Returns `Ok(None)` if no such folder exists. Several matching
    /// folders are reported as [`RemoteError::Fatal`], since the sync root
    /// would be ambiguous.
    async fn find_root_folder(&self, name: &str) -> Result<Option<RemoteId>, RemoteError>;

    /// Lists the folders directly under `parent_id`
    async fn list_child_folders(&self, parent_id: &RemoteId)
        -> Result<Vec<RemoteNode>, RemoteError>;

    /// Lists the files (non-folders) directly under `parent_id`
    async fn list_files(&self, parent_id: &RemoteId) -> Result<Vec<RemoteNode>, RemoteError>;

    /// Creates a folder and returns its identifier
    async fn create_folder(&self, name: &str, parent_id: &RemoteId)
        -> Result<RemoteId, RemoteError>;

    /// Creates a file with the given content and returns its identifier
    ///
    /// `content` is shared, so callers retrying the call clone it without
    /// copying the buffer.
    async fn create_file(
        &self,
        name: &str,
        parent_id: &RemoteId,
        content: Bytes,
        mime_type: &str,
    ) -> Result<RemoteId, RemoteError>;

    /// Replaces the content of an existing file
    async fn update_file_content(
        &self,
        id: &RemoteId,
        content: Bytes,
        mime_type: &str,
    ) -> Result<(), RemoteError>;

    /// Deletes a file or folder
    async fn delete_node(&self, id: &RemoteId) -> Result<(), RemoteError>;
}
