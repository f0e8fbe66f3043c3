//! drivemirror Sync - One-way tree mirroring engine
//!
//! Provides:
//! - Remote and local tree normalization into comparable folder sets
//! - Folder-level diffing and ordered structural mutations
//! - Per-folder file reconciliation driven by the change detector
//! - Retry with exponential backoff for transient remote failures
//!
//! ## Modules
//!
//! - [`engine`] - Sync orchestrator running the phases of one mirror run
//! - [`normalizer`] - Remote breadth-first walk and local walk into relative paths
//! - [`reconciler`] - File-level reconciliation of a single folder
//! - [`retry`] - Backoff policy applied to every remote call
//! - [`filesystem`] - Local filesystem adapter (walkdir, streaming MD5)
//! - [`result`] - Run summary and per-item errors

pub mod engine;
pub mod filesystem;
pub mod normalizer;
pub mod reconciler;
pub mod result;
pub mod retry;

use std::path::PathBuf;

use drivemirror_core::domain::errors::DomainError;
use drivemirror_core::ports::RemoteError;
use thiserror::Error;

pub use engine::{SyncEngine, SyncOptions, SyncPhase};
pub use result::{ItemError, SyncResult};

/// Errors that abort a synchronization run
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local root or the configuration is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote store rejected the credentials
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A remote call failed in a way that ends the run
    #[error("Remote operation '{operation}' failed: {source}")]
    Remote {
        /// Name of the failed operation
        operation: String,
        #[source]
        source: RemoteError,
    },

    /// The local tree could not be read
    #[error("Local I/O error at {}: {message}", path.display())]
    LocalIo { path: PathBuf, message: String },

    /// One of the trees cannot be mirrored as-is
    #[error("Invalid tree: {0}")]
    Plan(#[from] DomainError),

    /// The run was cancelled before it finished
    #[error("Synchronization cancelled")]
    Cancelled,
}

impl SyncError {
    /// Wraps a run-aborting remote failure
    pub fn from_remote(operation: impl Into<String>, err: RemoteError) -> Self {
        match err {
            RemoteError::Auth(message) => Self::Auth(message),
            source => Self::Remote {
                operation: operation.into(),
                source,
            },
        }
    }

    /// Process exit code the CLI reports for this error
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::Auth(_) => 3,
            Self::Cancelled => 130,
            _ => 2,
        }
    }
}
