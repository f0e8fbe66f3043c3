//! Domain entities and business logic
//!
//! This module contains the core domain types for drivemirror:
//! - Newtypes for validated identifiers, paths and hashes
//! - Node types describing entries of the remote and local trees
//! - The per-run folder index used to resolve parents
//! - The tree differ and the sync plan it produces
//! - The change detector and the per-folder file partition
//! - Domain-specific error types

pub mod change;
pub mod errors;
pub mod newtypes;
pub mod node;
pub mod plan;
pub mod reconcile;
pub mod tree;

// Re-export commonly used types
pub use change::{needs_update, quick_check, UpdateReason};
pub use errors::DomainError;
pub use newtypes::*;
pub use node::{LocalFile, NodeKind, RemoteNode};
pub use plan::{diff, SyncPlan};
pub use reconcile::{partition_files, FilePartition};
pub use tree::{FolderKey, LocalTree, ParentIndex};
