//! Domain error types
//!
//! This module defines error types specific to domain operations:
//! validation of identifiers, names and paths, and tree-shape violations
//! detected while normalizing or diffing folder trees.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid relative path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A node name that cannot take part in a relative path
    #[error("Invalid node name: {0:?}")]
    InvalidName(String),

    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid hash format (expected 32 hex digits of MD5)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Two folders of one tree normalize to the same relative path
    #[error("Duplicate folder: {path}")]
    DuplicateFolder {
        /// The path claimed twice
        path: String,
    },

    /// A folder whose parent folder is not part of the same tree
    #[error("Folder {path} has no parent in the tree")]
    OrphanPath {
        /// The orphaned path
        path: String,
    },

    /// A path that is not rooted at the synced folder
    #[error("Path {path} is not under root {root}")]
    ForeignRoot {
        /// The offending path
        path: String,
        /// The expected root segment
        root: String,
    },

    /// A folder that should already be indexed has no remote identifier
    #[error("No remote folder indexed for {0}")]
    UnresolvedFolder(String),
}
