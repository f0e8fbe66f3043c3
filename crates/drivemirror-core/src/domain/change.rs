//! Change detector
//!
//! Decides whether a file present on both sides must have its remote
//! content overwritten.
//!
//! ## Policy
//!
//! A remote file is stale when any of the following holds:
//!
//! 1. the local modification time is later than the remote one,
//! 2. the remote store reported no content hash,
//! 3. the local and remote hashes differ.
//!
//! Remote timestamps reflect upload time rather than filesystem mtime, so
//! the hash is the authoritative signal; the timestamp only serves as a
//! cheap trigger that avoids hashing. When the store omits the hash (Drive
//! does for Google-native documents) the comparison cannot confirm equality
//! and always reports a change.

use std::fmt;

use chrono::{DateTime, Utc};

use super::newtypes::ContentHash;

/// Why a remote file is considered stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    /// Local mtime is later than the remote modification time
    NewerLocally,
    /// The remote store supplied no content hash
    RemoteHashMissing,
    /// Content hashes differ
    HashMismatch,
}

impl UpdateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewerLocally => "newer_locally",
            Self::RemoteHashMissing => "remote_hash_missing",
            Self::HashMismatch => "hash_mismatch",
        }
    }
}

impl fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drive stores modification times with millisecond precision
fn is_newer(local: DateTime<Utc>, remote: Option<DateTime<Utc>>) -> bool {
    match remote {
        Some(remote) => local.timestamp_millis() > remote.timestamp_millis(),
        None => false,
    }
}

/// Evaluates the triggers that do not need a local hash
///
/// Returns `Some` when the outcome is already decided, so the caller can
/// skip hashing the local file. `None` means the hashes must be compared.
#[must_use]
pub fn quick_check(
    local_modified: DateTime<Utc>,
    remote_modified: Option<DateTime<Utc>>,
    remote_hash: Option<&ContentHash>,
) -> Option<UpdateReason> {
    if is_newer(local_modified, remote_modified) {
        return Some(UpdateReason::NewerLocally);
    }
    if remote_hash.is_none() {
        return Some(UpdateReason::RemoteHashMissing);
    }
    None
}

/// Full decision including the hash comparison
#[must_use]
pub fn detect(
    local_modified: DateTime<Utc>,
    remote_modified: Option<DateTime<Utc>>,
    local_hash: &ContentHash,
    remote_hash: Option<&ContentHash>,
) -> Option<UpdateReason> {
    quick_check(local_modified, remote_modified, remote_hash).or_else(|| {
        (remote_hash != Some(local_hash)).then_some(UpdateReason::HashMismatch)
    })
}

/// Whether the remote copy must be overwritten
#[must_use]
pub fn needs_update(
    local_modified: DateTime<Utc>,
    remote_modified: Option<DateTime<Utc>>,
    local_hash: &ContentHash,
    remote_hash: Option<&ContentHash>,
) -> bool {
    detect(local_modified, remote_modified, local_hash, remote_hash).is_some()
}
