//! Tree differ
//!
//! Compares the folder paths of the local and the remote tree and produces a
//! [`SyncPlan`]: which folders to create, which to delete, and which exist
//! on both sides, each in an order that is safe to execute.
//!
//! ## Ordering
//!
//! - `to_create` is sorted shallow-to-deep, so a folder's parent is always
//!   created (or already present) before the folder itself.
//! - `to_delete` is sorted deep-to-shallow, so children are removed before
//!   their parents. Cascading deletes are not assumed.
//! - Ties are broken lexicographically to keep runs reproducible.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Serialize;

use super::errors::DomainError;
use super::newtypes::RelativePath;

/// Result of diffing two folder trees
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    /// The sync root, always part of `common`
    pub root: RelativePath,
    /// Local-only folders, shallow first
    pub to_create: Vec<RelativePath>,
    /// Remote-only folders, deepest first
    pub to_delete: Vec<RelativePath>,
    /// Folders on both sides, root first
    pub common: Vec<RelativePath>,
}

impl SyncPlan {
    /// Whether the plan contains no structural change
    #[must_use]
    pub fn is_structurally_unchanged(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }
}

/// Shallow-to-deep order with lexicographic tie-break
fn by_depth(a: &RelativePath, b: &RelativePath) -> Ordering {
    a.depth().cmp(&b.depth()).then_with(|| a.cmp(b))
}

/// Ensures every path hangs off `root` through members of `paths`
fn check_shape(root: &RelativePath, paths: &BTreeSet<RelativePath>) -> Result<(), DomainError> {
    for path in paths {
        if path != root && !path.is_descendant_of(root) {
            return Err(DomainError::ForeignRoot {
                path: path.to_string(),
                root: root.to_string(),
            });
        }
        if let Some(parent) = path.parent() {
            if parent != *root && !paths.contains(&parent) {
                return Err(DomainError::OrphanPath {
                    path: path.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Computes the folder-level plan for one run
///
/// `remote` and `local` hold descendant folder paths of `root`; the root
/// itself may be present or not and is always reported as common.
///
/// # Errors
/// Returns an error if either tree is malformed: a path outside `root`, or a
/// path whose parent is missing from its own tree.
pub fn diff(
    root: &RelativePath,
    remote: &BTreeSet<RelativePath>,
    local: &BTreeSet<RelativePath>,
) -> Result<SyncPlan, DomainError> {
    check_shape(root, remote)?;
    check_shape(root, local)?;

    let mut to_create: Vec<RelativePath> = local
        .difference(remote)
        .filter(|path| *path != root)
        .cloned()
        .collect();
    let mut to_delete: Vec<RelativePath> = remote
        .difference(local)
        .filter(|path| *path != root)
        .cloned()
        .collect();
    let mut common: Vec<RelativePath> = local
        .intersection(remote)
        .filter(|path| *path != root)
        .cloned()
        .collect();
    common.push(root.clone());

    to_create.sort_by(by_depth);
    to_delete.sort_by(|a, b| by_depth(b, a));
    common.sort_by(by_depth);

    Ok(SyncPlan {
        root: root.clone(),
        to_create,
        to_delete,
        common,
    })
}
