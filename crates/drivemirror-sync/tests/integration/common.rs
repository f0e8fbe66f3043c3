//! Shared test helpers for sync engine integration tests
//!
//! Provides [`MemoryRemoteStore`], an in-memory implementation of
//! [`IRemoteStore`] with Drive-like semantics (parent-linked nodes, MD5
//! checksums, server-side modification times), plus helpers to build local
//! trees and engines.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use drivemirror_core::domain::{ContentHash, NodeKind, RemoteId, RemoteNode};
use drivemirror_core::ports::{IRemoteStore, RemoteError};
use drivemirror_sync::filesystem::LocalFileSystemAdapter;
use drivemirror_sync::retry::RetryPolicy;
use drivemirror_sync::{SyncEngine, SyncOptions};
use tempfile::TempDir;

// ============================================================================
// MemoryRemoteStore
// ============================================================================

#[derive(Debug, Clone)]
struct StoredNode {
    node: RemoteNode,
    content: Vec<u8>,
}

#[derive(Default)]
struct State {
    nodes: HashMap<RemoteId, StoredNode>,
    next_id: u64,
    /// Persistent failures keyed by (operation, node name)
    failures: HashMap<(String, String), RemoteError>,
    /// Remaining transient failures per operation
    transient: HashMap<String, u32>,
    /// Calls per operation
    calls: HashMap<String, u32>,
    mutations: u32,
}

impl State {
    fn allocate_id(&mut self) -> RemoteId {
        self.next_id += 1;
        RemoteId::new(format!("node{:04}", self.next_id)).unwrap()
    }

    fn record_call(&mut self, op: &str, name: &str) -> Result<(), RemoteError> {
        *self.calls.entry(op.to_string()).or_default() += 1;
        if let Some(left) = self.transient.get_mut(op) {
            if *left > 0 {
                *left -= 1;
                return Err(RemoteError::Transient {
                    message: format!("injected transient failure in {op}"),
                    retry_after: Some(Duration::from_millis(1)),
                });
            }
        }
        if let Some(err) = self.failures.get(&(op.to_string(), name.to_string())) {
            return Err(err.clone());
        }
        Ok(())
    }

    fn children_of(&self, parent: &RemoteId) -> impl Iterator<Item = &StoredNode> {
        let parent = parent.clone();
        self.nodes
            .values()
            .filter(move |n| n.node.parent_id.as_ref() == Some(&parent))
    }

    fn require_folder(&self, id: &RemoteId) -> Result<(), RemoteError> {
        if *id == RemoteId::drive_root() {
            return Ok(());
        }
        match self.nodes.get(id) {
            Some(n) if n.node.kind == NodeKind::Folder => Ok(()),
            _ => Err(RemoteError::NotFound(id.to_string())),
        }
    }

    fn remove_subtree(&mut self, id: &RemoteId) {
        let children: Vec<RemoteId> = self.children_of(id).map(|n| n.node.id.clone()).collect();
        for child in children {
            self.remove_subtree(&child);
        }
        self.nodes.remove(id);
    }
}

fn md5_of(content: &[u8]) -> ContentHash {
    ContentHash::new(format!("{:x}", md5::compute(content))).unwrap()
}

/// In-memory remote store with Drive-like behaviour
#[derive(Default)]
pub struct MemoryRemoteStore {
    state: Mutex<State>,
}

impl MemoryRemoteStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // --- seeding (not counted as mutations) ---

    /// Adds a folder under `parent` (`"root"` for the top level)
    pub fn seed_folder(&self, parent: &RemoteId, name: &str) -> RemoteId {
        let mut state = self.state.lock().unwrap();
        let id = state.allocate_id();
        let node = RemoteNode::folder(id.clone(), name, Some(parent.clone()));
        state.nodes.insert(
            id.clone(),
            StoredNode {
                node,
                content: Vec::new(),
            },
        );
        id
    }

    /// Adds a file with a checksum and the given modification time
    pub fn seed_file(
        &self,
        parent: &RemoteId,
        name: &str,
        content: &[u8],
        modified: DateTime<Utc>,
    ) -> RemoteId {
        self.seed(parent, name, content, modified, Some(md5_of(content)), "text/plain")
    }

    /// Adds a file the store does not checksum (a Google-native document)
    pub fn seed_native_file(&self, parent: &RemoteId, name: &str) -> RemoteId {
        self.seed(
            parent,
            name,
            b"",
            Utc::now(),
            None,
            "application/vnd.google-apps.document",
        )
    }

    fn seed(
        &self,
        parent: &RemoteId,
        name: &str,
        content: &[u8],
        modified: DateTime<Utc>,
        hash: Option<ContentHash>,
        mime: &str,
    ) -> RemoteId {
        let mut state = self.state.lock().unwrap();
        let id = state.allocate_id();
        let mut node = RemoteNode::file(id.clone(), name, Some(parent.clone()))
            .with_modified_time(modified)
            .with_mime_type(mime);
        node.content_hash = hash;
        state.nodes.insert(
            id.clone(),
            StoredNode {
                node,
                content: content.to_vec(),
            },
        );
        id
    }

    // --- fault injection ---

    /// Makes every `op` call on a node named `name` fail with `err`
    pub fn fail_on(&self, op: &str, name: &str, err: RemoteError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((op.to_string(), name.to_string()), err);
    }

    /// Makes the next `count` calls of `op` fail transiently
    pub fn fail_transiently(&self, op: &str, count: u32) {
        self.state
            .lock()
            .unwrap()
            .transient
            .insert(op.to_string(), count);
    }

    // --- inspection ---

    /// Number of successful mutations since creation
    pub fn mutations(&self) -> u32 {
        self.state.lock().unwrap().mutations
    }

    /// Number of calls of `op`, failed ones included
    pub fn calls(&self, op: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    /// Resolves a slash-separated path from the top level
    pub fn lookup(&self, path: &str) -> Option<RemoteNode> {
        let state = self.state.lock().unwrap();
        let mut parent = RemoteId::drive_root();
        let mut found = None;
        for segment in path.split('/') {
            let node = state
                .children_of(&parent)
                .find(|n| n.node.name == segment)?
                .node
                .clone();
            parent = node.id.clone();
            found = Some(node);
        }
        found
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    /// Content of the file at `path`
    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        let node = self.lookup(path)?;
        let state = self.state.lock().unwrap();
        state.nodes.get(&node.id).map(|n| n.content.clone())
    }

    /// Names of the direct children of the folder at `path`, sorted
    pub fn children(&self, path: &str) -> Vec<String> {
        let Some(folder) = self.lookup(path) else {
            return Vec::new();
        };
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .children_of(&folder.id)
            .map(|n| n.node.name.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl IRemoteStore for MemoryRemoteStore {
    async fn find_root_folder(&self, name: &str) -> Result<Option<RemoteId>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.record_call("find_root_folder", name)?;
        let matches: Vec<RemoteId> = state
            .children_of(&RemoteId::drive_root())
            .filter(|n| n.node.is_folder() && n.node.name == name)
            .map(|n| n.node.id.clone())
            .collect();
        match matches.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(id.clone())),
            _ => Err(RemoteError::Fatal(format!("several top-level folders named {name}"))),
        }
    }

    async fn list_child_folders(&self, parent_id: &RemoteId) -> Result<Vec<RemoteNode>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.record_call("list_child_folders", parent_id.as_str())?;
        state.require_folder(parent_id)?;
        Ok(state
            .children_of(parent_id)
            .filter(|n| n.node.is_folder())
            .map(|n| n.node.clone())
            .collect())
    }

    async fn list_files(&self, parent_id: &RemoteId) -> Result<Vec<RemoteNode>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.record_call("list_files", parent_id.as_str())?;
        state.require_folder(parent_id)?;
        Ok(state
            .children_of(parent_id)
            .filter(|n| !n.node.is_folder())
            .map(|n| n.node.clone())
            .collect())
    }

    async fn create_folder(&self, name: &str, parent_id: &RemoteId) -> Result<RemoteId, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.record_call("create_folder", name)?;
        state.require_folder(parent_id)?;
        let id = state.allocate_id();
        let node = RemoteNode::folder(id.clone(), name, Some(parent_id.clone()));
        state.nodes.insert(
            id.clone(),
            StoredNode {
                node,
                content: Vec::new(),
            },
        );
        state.mutations += 1;
        Ok(id)
    }

    async fn create_file(
        &self,
        name: &str,
        parent_id: &RemoteId,
        content: Bytes,
        mime_type: &str,
    ) -> Result<RemoteId, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.record_call("create_file", name)?;
        state.require_folder(parent_id)?;
        let id = state.allocate_id();
        let node = RemoteNode::file(id.clone(), name, Some(parent_id.clone()))
            .with_modified_time(Utc::now())
            .with_content_hash(md5_of(&content))
            .with_mime_type(mime_type);
        state.nodes.insert(
            id.clone(),
            StoredNode {
                node,
                content: content.to_vec(),
            },
        );
        state.mutations += 1;
        Ok(id)
    }

    async fn update_file_content(
        &self,
        id: &RemoteId,
        content: Bytes,
        mime_type: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        let name = state
            .nodes
            .get(id)
            .map(|n| n.node.name.clone())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        state.record_call("update_file_content", &name)?;
        let stored = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        stored.node.modified_time = Some(Utc::now());
        stored.node.content_hash = Some(md5_of(&content));
        stored.node.mime_type = Some(mime_type.to_string());
        stored.content = content.to_vec();
        state.mutations += 1;
        Ok(())
    }

    async fn delete_node(&self, id: &RemoteId) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        let name = state
            .nodes
            .get(id)
            .map(|n| n.node.name.clone())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        state.record_call("delete_node", &name)?;
        state.remove_subtree(id);
        state.mutations += 1;
        Ok(())
    }
}

// ============================================================================
// Local trees and engines
// ============================================================================

/// A temporary directory holding the sync root `proj`
pub struct LocalDir {
    _dir: TempDir,
    pub root: PathBuf,
}

impl LocalDir {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("proj");
        std::fs::create_dir(&root).unwrap();
        Self { _dir: dir, root }
    }

    /// Writes a file relative to the root, creating parent directories
    pub fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn mkdir(&self, rel: &str) {
        std::fs::create_dir_all(self.root.join(rel)).unwrap();
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.root.join(rel)).unwrap()
    }

    /// Backdates a file's modification time
    pub fn set_mtime(&self, rel: &str, when: DateTime<Utc>) {
        let mtime = filetime::FileTime::from_unix_time(when.timestamp(), 0);
        filetime::set_file_mtime(self.root.join(rel), mtime).unwrap();
    }

    pub fn path(&self) -> &Path {
        &self.root
    }
}

/// Fast-retrying options for tests
pub fn test_options() -> SyncOptions {
    SyncOptions {
        list_concurrency: 4,
        upload_concurrency: 2,
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
    }
}

/// Engine over `store` and the real local filesystem
pub fn engine(store: &Arc<MemoryRemoteStore>) -> SyncEngine {
    let remote: Arc<dyn IRemoteStore> = store.clone();
    SyncEngine::with_options(remote, Arc::new(LocalFileSystemAdapter::new()), test_options())
}

/// MD5 of `content` as a lowercase hex string
pub fn md5_hex(content: &[u8]) -> String {
    format!("{:x}", md5::compute(content))
}
