//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// RemoteId
// ============================================================================

/// Opaque identifier of a node in the remote store
///
/// Drive file IDs are URL-safe strings such as
/// `"1A2b3C4d5E6f7G8h9I0jKlMnOpQrStUvW"`. The well-known alias `root`
/// addresses the top level of the user's drive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteId(String);

impl RemoteId {
    /// Alias of the top-level folder of the remote store
    pub const DRIVE_ROOT: &'static str = "root";

    /// Create a new RemoteId
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains characters that would
    /// break query strings or URL paths
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "Remote ID cannot be empty".to_string(),
            ));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(DomainError::InvalidRemoteId(format!(
                "Remote ID contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// The identifier of the remote store's top-level folder
    #[must_use]
    pub fn drive_root() -> Self {
        Self(Self::DRIVE_ROOT.to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemoteId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteId> for String {
    fn from(id: RemoteId) -> Self {
        id.0
    }
}

// ============================================================================
// RelativePath
// ============================================================================

/// Folder path relative to the parent of the synced root
///
/// Built by joining ancestor names with [`RelativePath::SEPARATOR`], always
/// starting with the synced folder's own name: the root of a sync of
/// `/home/me/proj` is `proj`, its subfolder `docs` is `proj/docs`.
///
/// This is the join key between the local and the remote tree, so both
/// sides must produce it the same way. Names that contain the separator,
/// are empty, or are `.`/`..` are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Separator between path segments
    pub const SEPARATOR: char = '/';

    /// Create a RelativePath from its joined string form
    ///
    /// # Errors
    /// Returns error if the string is empty or any segment is not a valid
    /// node name
    pub fn new(path: String) -> Result<Self, DomainError> {
        if path.is_empty() {
            return Err(DomainError::InvalidPath(
                "Relative path cannot be empty".to_string(),
            ));
        }

        for segment in path.split(Self::SEPARATOR) {
            if Self::validate_name(segment).is_err() {
                return Err(DomainError::InvalidPath(path));
            }
        }

        Ok(Self(path))
    }

    /// Create the single-segment path of a sync root
    ///
    /// # Errors
    /// Returns error if `name` is not a valid node name
    pub fn root(name: &str) -> Result<Self, DomainError> {
        Self::validate_name(name)?;
        Ok(Self(name.to_string()))
    }

    /// Check that `name` can be used as a single path segment
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidName`] for empty names, `.`, `..`, and
    /// names containing the separator or a NUL byte
    pub fn validate_name(name: &str) -> Result<(), DomainError> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(Self::SEPARATOR)
            || name.contains('\0')
        {
            return Err(DomainError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Append a child segment
    ///
    /// # Errors
    /// Returns error if `name` is not a valid node name
    pub fn join(&self, name: &str) -> Result<Self, DomainError> {
        Self::validate_name(name)?;
        Ok(Self(format!("{}{}{}", self.0, Self::SEPARATOR, name)))
    }

    /// Number of separators in the path; the root has depth 0
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.matches(Self::SEPARATOR).count()
    }

    /// The enclosing path, or `None` for a root path
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rfind(Self::SEPARATOR)
            .map(|idx| Self(self.0[..idx].to_string()))
    }

    /// Last segment
    #[must_use]
    pub fn name(&self) -> &str {
        self.0
            .rsplit(Self::SEPARATOR)
            .next()
            .unwrap_or(self.0.as_str())
    }

    /// First segment, i.e. the name of the sync root
    #[must_use]
    pub fn root_name(&self) -> &str {
        self.0
            .split(Self::SEPARATOR)
            .next()
            .unwrap_or(self.0.as_str())
    }

    /// Whether this is a single-segment root path
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.depth() == 0
    }

    /// Whether `self` lies strictly below `ancestor`
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &RelativePath) -> bool {
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(ancestor.as_str())
            && self.0[ancestor.0.len()..].starts_with(Self::SEPARATOR)
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RelativePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RelativePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}

// ============================================================================
// ContentHash
// ============================================================================

/// MD5 digest of a file's content as 32 lowercase hex digits
///
/// MD5 is the algorithm behind Drive's `md5Checksum` field, which lets a
/// local file be compared to its remote copy without downloading it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Length of an MD5 digest in hex digits
    const HEX_LEN: usize = 32;

    /// Create a new ContentHash, normalizing to lowercase
    ///
    /// # Errors
    /// Returns error if the value is not 32 hex digits
    pub fn new(hash: String) -> Result<Self, DomainError> {
        if hash.len() != Self::HEX_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidHash(hash));
        }
        Ok(Self(hash.to_ascii_lowercase()))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ContentHash {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}
