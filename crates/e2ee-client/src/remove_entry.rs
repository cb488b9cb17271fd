//! Propagating a delete inside an encrypted folder

use crate::{ClientError, E2eeApi, FolderMetadataHandler, Result, SyncJournal};
use e2ee_metadata::Account;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Removes the entry `original_filename` from the encrypted folder at
/// `folder_path`: drops it from the metadata, then deletes the item on the
/// server, both under one lock.
pub struct RemoveEncryptedEntryJob {
    api: Arc<dyn E2eeApi>,
    journal: Arc<dyn SyncJournal>,
    account: Arc<Account>,
    folder_path: String,
    original_filename: String,
}

impl RemoveEncryptedEntryJob {
    pub fn new(
        api: Arc<dyn E2eeApi>,
        journal: Arc<dyn SyncJournal>,
        account: Arc<Account>,
        folder_path: impl Into<String>,
        original_filename: impl Into<String>,
    ) -> Self {
        Self {
            api,
            journal,
            account,
            folder_path: folder_path.into(),
            original_filename: original_filename.into(),
        }
    }

    #[instrument(skip(self), fields(folder = %self.folder_path, name = %self.original_filename))]
    pub async fn run(self) -> Result<()> {
        let root_info = self.journal.root_info_for(&self.folder_path)?;
        let mut handler =
            FolderMetadataHandler::new(self.api.clone(), self.account.clone(), self.folder_path.clone(), root_info);
        handler.fetch_metadata(false).await?;

        let metadata = handler.require_metadata_mut()?;
        let encrypted_filename = metadata
            .file(&self.original_filename)
            .map(|file| file.encrypted_filename.clone())
            .ok_or_else(|| ClientError::EntryNotFound(self.original_filename.clone()))?;
        metadata.remove_encrypted_file(&self.original_filename);

        handler.upload_metadata(true).await?;
        let token = handler.folder_token().unwrap_or_default().to_string();
        let remote_path = format!("{}/{}", self.folder_path.trim_end_matches('/'), encrypted_filename);

        if let Err(e) = self.api.delete_item(&remote_path, &token).await {
            if let Err(unlock_error) = handler.unlock_folder().await {
                warn!(error = %unlock_error, "unlock after failed delete also failed");
            }
            return Err(e);
        }
        handler.unlock_folder().await
    }
}
