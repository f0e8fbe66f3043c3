//! Drive search query construction
//!
//! Builds the `q` parameter of `files.list`. String literals in Drive's
//! query language are single-quoted, so names and identifiers are escaped
//! before interpolation.

use drivemirror_core::domain::RemoteId;

/// Mime type Drive uses for folders
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Prefix shared by Google-native document types (Docs, Sheets, ...)
pub const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";

/// Escapes a value for use inside a single-quoted query literal
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Top-level, non-trashed folders called `name`
pub fn root_folder_named(name: &str) -> String {
    format!(
        "'{}' in parents and mimeType = '{FOLDER_MIME}' and name = '{}' and trashed = false",
        RemoteId::DRIVE_ROOT,
        escape(name)
    )
}

/// Non-trashed folders directly under `parent`
pub fn child_folders(parent: &RemoteId) -> String {
    format!(
        "'{}' in parents and mimeType = '{FOLDER_MIME}' and trashed = false",
        escape(parent.as_str())
    )
}

/// Non-trashed non-folders directly under `parent`
pub fn child_files(parent: &RemoteId) -> String {
    format!(
        "'{}' in parents and mimeType != '{FOLDER_MIME}' and trashed = false",
        escape(parent.as_str())
    )
}

/// Whether `mime_type` is a Google-native document, which has no checksum
pub fn is_native(mime_type: &str) -> bool {
    mime_type.starts_with(NATIVE_MIME_PREFIX)
}
