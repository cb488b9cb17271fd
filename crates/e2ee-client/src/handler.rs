//! Fetch, lock, upload and unlock of one folder's metadata
//!
//! [`FolderMetadataHandler`] drives a single folder through the server
//! protocol. Every step records a [`HandlerState`]; a lock taken by the
//! handler is released on every exit path, including drop.

use crate::{remote::ApiRootMetadataSource, ClientError, E2eeApi, Result};
use bytes::Bytes;
use e2ee_metadata::{Account, FolderMetadata, MetadataVersion, RootEncryptedFolderInfo};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Last step a [`FolderMetadataHandler`] entered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerState {
    Idle,
    ResolvingFolderId,
    Fetching,
    Fetched,
    Locking,
    Locked,
    Uploading,
    Unlocking,
    Done,
    Failed,
}

/// Orchestrates metadata access for the folder at `path`
pub struct FolderMetadataHandler {
    api: Arc<dyn E2eeApi>,
    account: Arc<Account>,
    path: String,
    root_info: RootEncryptedFolderInfo,
    state: HandlerState,
    folder_id: Option<String>,
    folder_token: Option<String>,
    is_folder_locked: bool,
    /// The lock was taken by this handler, not inherited
    owns_lock: bool,
    is_new_metadata_created: bool,
    metadata: Option<FolderMetadata>,
}

impl FolderMetadataHandler {
    pub fn new(
        api: Arc<dyn E2eeApi>,
        account: Arc<Account>,
        path: impl Into<String>,
        root_info: RootEncryptedFolderInfo,
    ) -> Self {
        Self {
            api,
            account,
            path: path.into(),
            root_info,
            state: HandlerState::Idle,
            folder_id: None,
            folder_token: None,
            is_folder_locked: false,
            owns_lock: false,
            is_new_metadata_created: false,
            metadata: None,
        }
    }

    /// Skip the folder id lookup
    pub fn with_folder_id(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    fn fail(&mut self, e: ClientError) -> ClientError {
        error!(path = %self.path, state = ?self.state, error = %e, "metadata operation failed");
        self.state = HandlerState::Failed;
        e
    }

    /// Refuse `operation` unless the handler is in one of `allowed`
    fn require_state(&mut self, operation: &str, allowed: &[HandlerState]) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        let message = format!("cannot {operation} while {:?}", self.state);
        Err(self.fail(ClientError::InvalidState(message)))
    }

    async fn resolve_folder_id(&mut self) -> Result<String> {
        if let Some(id) = &self.folder_id {
            return Ok(id.clone());
        }
        self.state = HandlerState::ResolvingFolderId;
        match self.api.folder_id(&self.path).await {
            Ok(id) => {
                self.folder_id = Some(id.clone());
                Ok(id)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Fetch and parse the folder's metadata with the handler's root info.
    ///
    /// With `allow_empty`, a folder without metadata (404 or an empty body)
    /// yields fresh metadata and the next upload stores instead of updating.
    /// Without it an empty body is [`ClientError::EmptyMetadata`].
    pub async fn fetch_metadata(&mut self, allow_empty: bool) -> Result<()> {
        let root_info = self.root_info.clone();
        self.fetch_metadata_with_root_info(root_info, allow_empty).await
    }

    #[instrument(skip(self, root_info), fields(path = %self.path))]
    pub async fn fetch_metadata_with_root_info(
        &mut self,
        root_info: RootEncryptedFolderInfo,
        allow_empty: bool,
    ) -> Result<()> {
        let folder_id = self.resolve_folder_id().await?;
        self.state = HandlerState::Fetching;

        let bytes = match self.api.get_metadata(&folder_id).await {
            Ok(bytes) if bytes.is_empty() && !allow_empty => {
                return Err(self.fail(ClientError::EmptyMetadata(self.path.clone())));
            }
            Ok(bytes) => {
                self.is_new_metadata_created = bytes.is_empty();
                bytes
            }
            Err(e) if e.is_not_found() && allow_empty => {
                debug!("folder has no metadata yet");
                self.is_new_metadata_created = true;
                Bytes::new()
            }
            Err(e) => return Err(self.fail(e)),
        };
        self.parse(&bytes, root_info).await?;
        self.state = HandlerState::Fetched;
        Ok(())
    }

    /// Fresh metadata for a folder being encrypted. Nested folders fetch
    /// their top-level folder's keys.
    pub async fn create_empty_metadata(&mut self) -> Result<()> {
        let root_info = self.root_info.clone();
        self.parse(&[], root_info).await?;
        self.is_new_metadata_created = true;
        self.state = HandlerState::Fetched;
        Ok(())
    }

    async fn parse(&mut self, bytes: &[u8], root_info: RootEncryptedFolderInfo) -> Result<()> {
        let source = ApiRootMetadataSource::new(self.api.clone());
        let metadata = match FolderMetadata::load(self.account.clone(), bytes, root_info, &source).await {
            Ok(metadata) => metadata,
            Err(e) => return Err(self.fail(e.into())),
        };
        if !metadata.is_valid() {
            return Err(self.fail(ClientError::InvalidState("parsed metadata is not valid".to_string())));
        }
        self.metadata = Some(metadata);
        Ok(())
    }

    /// Take the folder's lock. v2.0 servers are sent the counter of the next
    /// write when metadata is loaded.
    #[instrument(skip(self), fields(path = %self.path))]
    pub async fn lock_folder(&mut self) -> Result<()> {
        if self.is_folder_locked {
            return Err(self.fail(ClientError::InvalidState("folder is already locked".to_string())));
        }
        self.require_state("lock", &[HandlerState::Idle, HandlerState::Fetched, HandlerState::Done])?;
        let folder_id = self.resolve_folder_id().await?;
        self.state = HandlerState::Locking;

        let counter = self
            .metadata
            .as_ref()
            .filter(|_| self.account.latest_supported_metadata_version() >= MetadataVersion::V2_0)
            .map(FolderMetadata::new_counter);
        let public_key = match self.account.public_key().to_pem() {
            Ok(pem) => pem,
            Err(e) => return Err(self.fail(e.into())),
        };

        match self.api.lock_folder(&folder_id, &public_key, counter).await {
            Ok(token) => {
                self.folder_token = Some(token);
                self.is_folder_locked = true;
                self.owns_lock = true;
                self.state = HandlerState::Locked;
                info!(%folder_id, "folder locked");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Serialize and upload the metadata, locking first when no token is
    /// held. Stores on first creation and updates otherwise. On failure the
    /// lock is released before the error is returned.
    #[instrument(skip(self), fields(path = %self.path))]
    pub async fn upload_metadata(&mut self, keep_locked: bool) -> Result<()> {
        if self.metadata.is_none() {
            return Err(self.fail(ClientError::InvalidState("no metadata to upload".to_string())));
        }
        self.require_state("upload", &[HandlerState::Fetched, HandlerState::Locked])?;
        if self.folder_token.is_none() {
            self.lock_folder().await?;
        }

        self.state = HandlerState::Uploading;
        if let Err(e) = self.upload().await {
            if let Err(unlock_error) = self.unlock_folder().await {
                warn!(error = %unlock_error, "unlock after failed upload also failed");
            }
            return Err(self.fail(e));
        }
        self.is_new_metadata_created = false;

        if keep_locked {
            self.state = HandlerState::Locked;
            return Ok(());
        }
        self.unlock_folder().await
    }

    async fn upload(&mut self) -> Result<()> {
        let (Some(folder_id), Some(token), Some(metadata)) =
            (self.folder_id.clone(), self.folder_token.clone(), self.metadata.as_mut())
        else {
            return Err(ClientError::InvalidState("upload without folder id, token or metadata".to_string()));
        };

        let bytes = Bytes::from(metadata.encrypted_metadata()?);
        if self.is_new_metadata_created {
            self.api.store_metadata(&folder_id, &token, bytes).await
        } else {
            self.api.update_metadata(&folder_id, &token, bytes).await
        }
    }

    /// Release the lock. Without a token this does nothing; an inherited
    /// token is forgotten but left to its owner. Lock state is cleared even
    /// when the server call fails.
    ///
    /// An owned lock is only released after it was taken, not while a
    /// fetch or another lock request is still in flight.
    #[instrument(skip(self), fields(path = %self.path))]
    pub async fn unlock_folder(&mut self) -> Result<()> {
        if self.folder_token.is_none() {
            debug!("no lock held");
            return Ok(());
        }
        if self.owns_lock {
            self.require_state(
                "unlock",
                &[
                    HandlerState::Locked,
                    HandlerState::Fetched,
                    HandlerState::Uploading,
                    HandlerState::Failed,
                ],
            )?;
        }
        let Some(token) = self.folder_token.take() else {
            return Ok(());
        };
        let owned = std::mem::take(&mut self.owns_lock);
        self.is_folder_locked = false;
        if !owned {
            self.state = HandlerState::Done;
            return Ok(());
        }

        self.state = HandlerState::Unlocking;
        let folder_id = self.folder_id.clone().unwrap_or_default();
        match self.api.unlock_folder(&folder_id, &token).await {
            Ok(()) => {
                info!(%folder_id, "folder unlocked");
                self.state = HandlerState::Done;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Work under a lock held by an outer operation. The handler will not
    /// release it.
    pub fn set_folder_token(&mut self, token: impl Into<String>) {
        self.folder_token = Some(token.into());
        self.is_folder_locked = true;
        self.owns_lock = false;
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    pub fn folder_id(&self) -> Option<&str> {
        self.folder_id.as_deref()
    }

    pub fn folder_token(&self) -> Option<&str> {
        self.folder_token.as_deref()
    }

    pub fn is_folder_locked(&self) -> bool {
        self.is_folder_locked
    }

    pub fn is_new_metadata_created(&self) -> bool {
        self.is_new_metadata_created
    }

    pub fn metadata(&self) -> Option<&FolderMetadata> {
        self.metadata.as_ref()
    }

    pub fn metadata_mut(&mut self) -> Option<&mut FolderMetadata> {
        self.metadata.as_mut()
    }

    /// The loaded metadata, or an error when nothing was fetched yet
    pub fn require_metadata_mut(&mut self) -> Result<&mut FolderMetadata> {
        self.metadata
            .as_mut()
            .ok_or_else(|| ClientError::InvalidState("metadata was not fetched".to_string()))
    }
}

impl Drop for FolderMetadataHandler {
    fn drop(&mut self) {
        if !self.owns_lock {
            return;
        }
        let (Some(folder_id), Some(token)) = (self.folder_id.take(), self.folder_token.take()) else {
            return;
        };
        warn!(path = %self.path, "handler dropped while holding a lock, unlocking");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let api = self.api.clone();
                runtime.spawn(async move {
                    if let Err(e) = api.unlock_folder(&folder_id, &token).await {
                        warn!(%folder_id, error = %e, "unlock on drop failed");
                    }
                });
            }
            Err(_) => error!(%folder_id, "no runtime to unlock on, folder stays locked"),
        }
    }
}
