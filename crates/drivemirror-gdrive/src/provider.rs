//! DriveRemoteStore - IRemoteStore implementation for Google Drive
//!
//! Translates the port's tree operations into Drive queries and uploads,
//! converts Drive file resources into [`RemoteNode`]s, and classifies
//! HTTP failures into [`RemoteError`]s.
//!
//! ## Design Notes
//!
//! - Google-native documents (Docs, Sheets, ...) carry no `md5Checksum`.
//!   Their hash is always reported as absent, even if a value shows up, so
//!   the change detector treats them as changed.
//! - A malformed `md5Checksum` is logged and dropped rather than failing
//!   the listing.
//! - On a 401 the store asks its [`TokenRefresher`] (if any) for a new
//!   access token and repeats the call once. Concurrent callers that hit
//!   the same expired token share one refresh.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use drivemirror_core::domain::{ContentHash, RemoteId, RemoteNode};
use drivemirror_core::ports::{IRemoteStore, RemoteError};

use crate::client::{DriveClient, DriveFile};
use crate::query;
use crate::DriveError;

// ============================================================================
// TokenRefresher
// ============================================================================

/// Source of a fresh access token after the current one was rejected
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh_access_token(&self) -> anyhow::Result<String>;
}

// ============================================================================
// Drive resource conversion
// ============================================================================

fn remote_id(value: &str) -> Result<RemoteId, RemoteError> {
    RemoteId::new(value.to_string())
        .map_err(|e| RemoteError::Fatal(format!("Drive returned an unusable id: {e}")))
}

/// Converts a Drive file resource into a port-level node
fn to_node(file: DriveFile) -> Result<RemoteNode, RemoteError> {
    let id = remote_id(&file.id)?;
    let parent_id = file
        .parents
        .first()
        .and_then(|p| RemoteId::new(p.clone()).ok());

    if file.is_folder() {
        return Ok(RemoteNode::folder(id, file.name, parent_id));
    }

    let content_hash = if query::is_native(&file.mime_type) {
        None
    } else {
        file.md5_checksum
            .and_then(|md5| match ContentHash::new(md5) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    warn!(id = %id, name = %file.name, error = %e, "Ignoring malformed md5Checksum");
                    None
                }
            })
    };

    let mut node = RemoteNode::file(id, file.name, parent_id);
    if !file.mime_type.is_empty() {
        node = node.with_mime_type(file.mime_type);
    }
    node.modified_time = file.modified_time;
    node.content_hash = content_hash;
    Ok(node)
}

fn to_nodes(files: Vec<DriveFile>) -> Result<Vec<RemoteNode>, RemoteError> {
    files.into_iter().map(to_node).collect()
}

// ============================================================================
// DriveRemoteStore
// ============================================================================

/// Remote store backed by the Drive v3 API
pub struct DriveRemoteStore {
    client: DriveClient,
    refresher: Option<Arc<dyn TokenRefresher>>,
    refresh_lock: Mutex<()>,
}

impl DriveRemoteStore {
    pub fn new(client: DriveClient) -> Self {
        Self {
            client,
            refresher: None,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn client(&self) -> &DriveClient {
        &self.client
    }

    /// Runs `call`, refreshing the token and repeating once on a 401
    async fn call<T, F, Fut>(&self, call: F) -> Result<T, RemoteError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, DriveError>>,
    {
        let token_used = self.client.access_token();
        match call().await {
            Err(DriveError::Unauthorized(message)) => {
                let Some(refresher) = &self.refresher else {
                    return Err(RemoteError::Auth(message));
                };
                self.refresh(refresher.as_ref(), &token_used).await?;
                call().await.map_err(RemoteError::from)
            }
            result => result.map_err(RemoteError::from),
        }
    }

    async fn refresh(&self, refresher: &dyn TokenRefresher, rejected: &str) -> Result<(), RemoteError> {
        let _guard = self.refresh_lock.lock().await;
        if self.client.access_token() != rejected {
            debug!("Token already refreshed by another task");
            return Ok(());
        }
        let token = refresher
            .refresh_access_token()
            .await
            .map_err(|e| RemoteError::Auth(format!("token refresh failed: {e:#}")))?;
        self.client.set_access_token(token);
        info!("Access token refreshed after 401");
        Ok(())
    }
}

#[async_trait]
impl IRemoteStore for DriveRemoteStore {
    #[instrument(skip(self))]
    async fn find_root_folder(&self, name: &str) -> Result<Option<RemoteId>, RemoteError> {
        let q = query::root_folder_named(name);
        let matches: Vec<DriveFile> = self
            .call(|| self.client.list_all(&q))
            .await?
            .into_iter()
            .filter(DriveFile::is_folder)
            .collect();

        match matches.as_slice() {
            [] => Ok(None),
            [only] => remote_id(&only.id).map(Some),
            several => Err(RemoteError::Fatal(format!(
                "{} top-level folders are named '{name}'; the sync root is ambiguous",
                several.len()
            ))),
        }
    }

    #[instrument(skip(self), fields(parent = %parent_id))]
    async fn list_child_folders(&self, parent_id: &RemoteId) -> Result<Vec<RemoteNode>, RemoteError> {
        let q = query::child_folders(parent_id);
        let files = self.call(|| self.client.list_all(&q)).await?;
        debug!(count = files.len(), "Listed child folders");
        to_nodes(files)
    }

    #[instrument(skip(self), fields(parent = %parent_id))]
    async fn list_files(&self, parent_id: &RemoteId) -> Result<Vec<RemoteNode>, RemoteError> {
        let q = query::child_files(parent_id);
        let files = self.call(|| self.client.list_all(&q)).await?;
        debug!(count = files.len(), "Listed files");
        to_nodes(files)
    }

    #[instrument(skip(self), fields(parent = %parent_id))]
    async fn create_folder(&self, name: &str, parent_id: &RemoteId) -> Result<RemoteId, RemoteError> {
        let created = self
            .call(|| self.client.create_folder(name, parent_id.as_str()))
            .await?;
        remote_id(&created.id)
    }

    #[instrument(skip(self, content), fields(parent = %parent_id, bytes = content.len()))]
    async fn create_file(
        &self,
        name: &str,
        parent_id: &RemoteId,
        content: Bytes,
        mime_type: &str,
    ) -> Result<RemoteId, RemoteError> {
        let created = self
            .call(|| {
                self.client
                    .upload_new(name, parent_id.as_str(), content.clone(), mime_type)
            })
            .await?;
        remote_id(&created.id)
    }

    #[instrument(skip(self, content), fields(id = %id, bytes = content.len()))]
    async fn update_file_content(
        &self,
        id: &RemoteId,
        content: Bytes,
        mime_type: &str,
    ) -> Result<(), RemoteError> {
        self.call(|| {
            self.client
                .update_content(id.as_str(), content.clone(), mime_type)
        })
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete_node(&self, id: &RemoteId) -> Result<(), RemoteError> {
        self.call(|| self.client.delete(id.as_str())).await
    }
}
