//! drivemirror Core - Domain logic for one-way tree mirroring
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `RelativePath`, `RemoteId`, `ContentHash`, `RemoteNode`, `ParentIndex`
//! - **Pure algorithms** - the tree differ ([`domain::plan`]), the change
//!   detector ([`domain::change`]) and the per-folder file partition
//!   ([`domain::reconcile`])
//! - **Port definitions** - Traits for adapters: `IRemoteStore`, `ILocalFileSystem`
//! - **Configuration** - YAML-backed [`config::Config`]
//!
//! # Architecture
//!
//! The domain module is pure: no I/O, no async. Ports define the trait
//! interfaces that adapter crates implement (`drivemirror-gdrive` for the
//! remote store, `drivemirror-sync` for the local filesystem). The
//! orchestration that drives both ports lives in `drivemirror-sync`.

pub mod config;
pub mod domain;
pub mod ports;
