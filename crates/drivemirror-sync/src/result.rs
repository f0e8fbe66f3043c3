//! Run summary
//!
//! [`SyncResult`] counts the mutations applied during one run and collects
//! the item-scoped failures that did not abort it.

use std::fmt;

use serde::Serialize;

/// A failure confined to one file or folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    /// Relative path of the affected item
    pub path: String,
    /// Operation that failed (`upload`, `update`, `delete_file`, ...)
    pub operation: String,
    /// Error description
    pub message: String,
}

impl ItemError {
    pub fn new(
        path: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.path, self.operation, self.message)
    }
}

/// Summary of a completed synchronization run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub folders_created: u32,
    pub folders_deleted: u32,
    pub files_created: u32,
    pub files_updated: u32,
    pub files_deleted: u32,
    /// Item-scoped failures; the run continued past each of them
    pub errors: Vec<ItemError>,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

impl SyncResult {
    /// Whether the run finished without any item error
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of remote mutations performed
    #[must_use]
    pub fn total_mutations(&self) -> u32 {
        self.folders_created
            + self.folders_deleted
            + self.files_created
            + self.files_updated
            + self.files_deleted
    }
}
