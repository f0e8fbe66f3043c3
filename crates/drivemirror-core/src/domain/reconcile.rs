//! Per-folder file partition
//!
//! Splits the files of one folder into what must be uploaded, removed, or
//! checked with the change detector. This is the pure half of the file
//! reconciler; the I/O half lives in `drivemirror-sync`.

use std::collections::BTreeMap;

use super::node::{LocalFile, RemoteNode};

/// Outcome of matching local and remote files by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilePartition {
    /// Local files with no remote counterpart
    pub to_upload: Vec<LocalFile>,
    /// Remote files with no local counterpart, plus surplus duplicates
    pub to_remove: Vec<RemoteNode>,
    /// Files present on both sides
    pub to_check: Vec<(LocalFile, RemoteNode)>,
}

impl FilePartition {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_upload.is_empty() && self.to_remove.is_empty() && self.to_check.is_empty()
    }
}

/// Matches `local` and `remote` files of one folder by name
///
/// Folder nodes in `remote` are ignored. When the remote folder holds
/// several files with the same name and that name exists locally, the most
/// recently modified copy is checked and the other copies are removed, so
/// the remote side ends up with one file per name.
#[must_use]
pub fn partition_files(local: &[LocalFile], remote: Vec<RemoteNode>) -> FilePartition {
    let mut by_name: BTreeMap<String, Vec<RemoteNode>> = BTreeMap::new();
    for node in remote.into_iter().filter(|n| !n.is_folder()) {
        by_name.entry(node.name.clone()).or_default().push(node);
    }

    let mut partition = FilePartition::default();

    let mut sorted_local: Vec<&LocalFile> = local.iter().collect();
    sorted_local.sort_by(|a, b| a.name.cmp(&b.name));

    for file in sorted_local {
        match by_name.remove(&file.name) {
            None => partition.to_upload.push(file.clone()),
            Some(mut copies) => {
                // Newest first; `None` timestamps sort last
                copies.sort_by(|a, b| {
                    b.modified_time
                        .cmp(&a.modified_time)
                        .then_with(|| a.id.cmp(&b.id))
                });
                let mut copies = copies.into_iter();
                if let Some(keep) = copies.next() {
                    partition.to_check.push((file.clone(), keep));
                }
                partition.to_remove.extend(copies);
            }
        }
    }

    // Whatever is left has no local counterpart
    for copies in by_name.into_values() {
        partition.to_remove.extend(copies);
    }

    partition
}
