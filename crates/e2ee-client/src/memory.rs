//! In-memory E2EE server for testing

use crate::{journal::parent_path, ClientError, E2eeApi, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// One request received by [`MemoryE2eeServer`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiCall {
    Lock { folder_id: String, counter: Option<u64> },
    Unlock { folder_id: String },
    GetMetadata { folder_id: String },
    StoreMetadata { folder_id: String },
    UpdateMetadata { folder_id: String },
    SetEncryptionFlag { folder_id: String },
    Delete { path: String },
}

#[derive(Debug, Default)]
struct RemoteItem {
    path: String,
    is_directory: bool,
    metadata: Option<Bytes>,
    encrypted: bool,
    lock_token: Option<String>,
    /// Counter of the last committed metadata write
    counter: u64,
    /// Counter sent with the current lock, committed by the next write
    pending_counter: Option<u64>,
}

#[derive(Default)]
struct ServerState {
    items: HashMap<String, RemoteItem>,
    ids_by_path: HashMap<String, String>,
    certificates: HashMap<String, String>,
    next_id: u64,
    next_token: u64,
    failing_updates: HashSet<String>,
    fail_next_unlock: bool,
    calls: Vec<ApiCall>,
}

impl ServerState {
    fn item(&self, folder_id: &str) -> Result<&RemoteItem> {
        self.items
            .get(folder_id)
            .ok_or_else(|| ClientError::http(404, format!("no item with id {folder_id}")))
    }

    fn item_mut(&mut self, folder_id: &str) -> Result<&mut RemoteItem> {
        self.items
            .get_mut(folder_id)
            .ok_or_else(|| ClientError::http(404, format!("no item with id {folder_id}")))
    }

    /// Token of the nearest locked folder at or above `path`
    fn lock_covering(&self, path: &str) -> Option<&str> {
        let mut current = Some(path);
        while let Some(path) = current {
            let token = self
                .ids_by_path
                .get(path)
                .and_then(|id| self.items.get(id))
                .and_then(|item| item.lock_token.as_deref());
            if token.is_some() {
                return token;
            }
            current = parent_path(path);
        }
        None
    }

    /// Whether a folder strictly below `path` holds a lock
    fn descendant_locked(&self, path: &str) -> bool {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        self.items
            .values()
            .any(|item| item.lock_token.is_some() && item.path.starts_with(&prefix))
    }

    /// Store `metadata` and commit the counter of the folder's lock
    fn commit(&mut self, folder_id: &str, metadata: Bytes) -> Result<()> {
        let item = self.item_mut(folder_id)?;
        item.metadata = Some(metadata);
        if let Some(counter) = item.pending_counter.take() {
            item.counter = counter;
        }
        Ok(())
    }

    fn check_token(&self, path: &str, token: &str) -> Result<()> {
        match self.lock_covering(path) {
            Some(held) if held == token => Ok(()),
            Some(_) => Err(ClientError::http(403, format!("wrong lock token for {path}"))),
            None => Err(ClientError::http(403, format!("{path} is not locked"))),
        }
    }
}

/// An in-memory server implementing [`E2eeApi`].
///
/// Enforces one lock per folder tree: a token is valid for the locked
/// folder and everything below it. Failures can be injected per folder.
#[derive(Clone, Default)]
pub struct MemoryE2eeServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryE2eeServer {
    /// Create a new empty server
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a folder and return its id. Registering a known path
    /// returns the existing id.
    pub fn add_folder(&self, path: &str) -> String {
        self.add_item(path, true)
    }

    pub fn add_file(&self, path: &str) -> String {
        self.add_item(path, false)
    }

    fn add_item(&self, path: &str, is_directory: bool) -> String {
        let mut state = self.state.lock();
        if let Some(id) = state.ids_by_path.get(path) {
            return id.clone();
        }
        state.next_id += 1;
        let id = state.next_id.to_string();
        state.ids_by_path.insert(path.to_string(), id.clone());
        state.items.insert(
            id.clone(),
            RemoteItem {
                path: path.to_string(),
                is_directory,
                ..Default::default()
            },
        );
        id
    }

    /// Publish a certificate for `user_id`
    pub fn add_certificate(&self, user_id: &str, pem: &str) {
        self.state
            .lock()
            .certificates
            .insert(user_id.to_string(), pem.to_string());
    }

    /// Overwrite a folder's metadata without locking
    pub fn put_metadata(&self, folder_id: &str, metadata: Bytes) {
        if let Some(item) = self.state.lock().items.get_mut(folder_id) {
            item.metadata = Some(metadata);
        }
    }

    pub fn metadata(&self, folder_id: &str) -> Option<Bytes> {
        self.state.lock().items.get(folder_id).and_then(|item| item.metadata.clone())
    }

    pub fn is_locked(&self, folder_id: &str) -> bool {
        self.state
            .lock()
            .items
            .get(folder_id)
            .is_some_and(|item| item.lock_token.is_some())
    }

    pub fn is_encrypted(&self, folder_id: &str) -> bool {
        self.state.lock().items.get(folder_id).is_some_and(|item| item.encrypted)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().ids_by_path.contains_key(path)
    }

    /// Counter committed by the last metadata write under a lock
    pub fn counter(&self, folder_id: &str) -> u64 {
        self.state.lock().items.get(folder_id).map_or(0, |item| item.counter)
    }

    /// Make metadata updates of `folder_id` fail with status 500
    pub fn fail_updates_for(&self, folder_id: &str) {
        self.state.lock().failing_updates.insert(folder_id.to_string());
    }

    pub fn clear_update_failures(&self) {
        self.state.lock().failing_updates.clear();
    }

    /// Make the next unlock fail with status 500. The lock is released anyway.
    pub fn fail_next_unlock(&self) {
        self.state.lock().fail_next_unlock = true;
    }

    /// Every request received so far
    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

#[async_trait]
impl E2eeApi for MemoryE2eeServer {
    async fn folder_id(&self, path: &str) -> Result<String> {
        self.state
            .lock()
            .ids_by_path
            .get(path)
            .cloned()
            .ok_or_else(|| ClientError::http(404, format!("{path} does not exist")))
    }

    async fn lock_folder(&self, folder_id: &str, _public_key_pem: &str, counter: Option<u64>) -> Result<String> {
        let mut state = self.state.lock();
        state.calls.push(ApiCall::Lock {
            folder_id: folder_id.to_string(),
            counter,
        });

        let path = state.item(folder_id)?.path.clone();
        if state.lock_covering(&path).is_some() || state.descendant_locked(&path) {
            return Err(ClientError::http(423, format!("{path} is already locked")));
        }
        let current = state.item(folder_id)?.counter;
        if let Some(counter) = counter {
            if counter <= current {
                return Err(ClientError::http(
                    409,
                    format!("counter {counter} does not advance past {current}"),
                ));
            }
        }

        state.next_token += 1;
        let token = format!("token-{}", state.next_token);
        let item = state.item_mut(folder_id)?;
        item.lock_token = Some(token.clone());
        item.pending_counter = counter;
        debug!(%folder_id, "folder locked");
        Ok(token)
    }

    async fn unlock_folder(&self, folder_id: &str, token: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ApiCall::Unlock {
            folder_id: folder_id.to_string(),
        });

        let item = state.item_mut(folder_id)?;
        match item.lock_token.as_deref() {
            None => return Err(ClientError::http(404, "folder is not locked")),
            Some(held) if held != token => return Err(ClientError::http(403, "wrong lock token")),
            Some(_) => {}
        }
        item.lock_token = None;
        item.pending_counter = None;
        if std::mem::take(&mut state.fail_next_unlock) {
            return Err(ClientError::http(500, "unlock failed"));
        }
        Ok(())
    }

    async fn get_metadata(&self, folder_id: &str) -> Result<Bytes> {
        let mut state = self.state.lock();
        state.calls.push(ApiCall::GetMetadata {
            folder_id: folder_id.to_string(),
        });
        state
            .item(folder_id)?
            .metadata
            .clone()
            .ok_or_else(|| ClientError::http(404, "no metadata"))
    }

    async fn store_metadata(&self, folder_id: &str, token: &str, metadata: Bytes) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ApiCall::StoreMetadata {
            folder_id: folder_id.to_string(),
        });

        let path = state.item(folder_id)?.path.clone();
        state.check_token(&path, token)?;
        if state.item(folder_id)?.metadata.is_some() {
            return Err(ClientError::http(409, "metadata already exists"));
        }
        state.commit(folder_id, metadata)
    }

    async fn update_metadata(&self, folder_id: &str, token: &str, metadata: Bytes) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ApiCall::UpdateMetadata {
            folder_id: folder_id.to_string(),
        });

        let path = state.item(folder_id)?.path.clone();
        state.check_token(&path, token)?;
        if state.failing_updates.contains(folder_id) {
            return Err(ClientError::http(500, "update failed"));
        }
        if state.item(folder_id)?.metadata.is_none() {
            return Err(ClientError::http(404, "no metadata to update"));
        }
        state.commit(folder_id, metadata)
    }

    async fn set_encryption_flag(&self, folder_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ApiCall::SetEncryptionFlag {
            folder_id: folder_id.to_string(),
        });

        let item = state.item_mut(folder_id)?;
        if !item.is_directory {
            return Err(ClientError::http(400, "only folders can be encrypted"));
        }
        item.encrypted = true;
        Ok(())
    }

    async fn user_certificate(&self, user_id: &str) -> Result<String> {
        self.state
            .lock()
            .certificates
            .get(user_id)
            .cloned()
            .ok_or_else(|| ClientError::http(404, format!("no certificate for {user_id}")))
    }

    async fn delete_item(&self, path: &str, token: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ApiCall::Delete { path: path.to_string() });

        if !state.ids_by_path.contains_key(path) {
            return Err(ClientError::http(404, format!("{path} does not exist")));
        }
        let parent = parent_path(path).unwrap_or(path).to_string();
        state.check_token(&parent, token)?;

        let prefix = format!("{path}/");
        let removed: Vec<(String, String)> = state
            .ids_by_path
            .iter()
            .filter(|(p, _)| p.as_str() == path || p.starts_with(&prefix))
            .map(|(p, id)| (p.clone(), id.clone()))
            .collect();
        for (p, id) in removed {
            state.ids_by_path.remove(&p);
            state.items.remove(&id);
        }
        Ok(())
    }
}
