//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStore`] - Parent-linked remote file store (Google Drive, in-memory fakes)
//! - [`ILocalFileSystem`] - Read access to the local tree being mirrored

pub mod local_filesystem;
pub mod remote_store;

pub use local_filesystem::{ILocalFileSystem, WalkEntry};
pub use remote_store::{IRemoteStore, RemoteError};
