//! Membership changes of a top-level encrypted folder
//!
//! Adding or removing a member rotates the metadata key. Nested encrypted
//! folders are encrypted with the top-level key, so after the top-level
//! upload every nested folder is re-encrypted with the new key, one at a
//! time, under the top-level lock.

use crate::{ClientError, E2eeApi, FolderMetadataHandler, Result, SyncJournal};
use e2ee_crypto::MetadataKey;
use e2ee_metadata::{Account, EncryptionStatus, RootEncryptedFolderInfo};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Change requested of an [`UpdateFolderUsersJob`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Grant access. Without a certificate the server's copy is used.
    Add {
        user_id: String,
        certificate_pem: Option<String>,
    },
    Remove {
        user_id: String,
    },
    /// Rotate the key and re-encrypt the folder tree, membership unchanged
    ReEncrypt,
}

/// One nested folder waiting to be re-encrypted
struct ReEncryptTask {
    path: String,
    folder_id: String,
    key_for_encryption: MetadataKey,
    key_for_decryption: MetadataKey,
    key_checksums: BTreeSet<String>,
}

/// Applies an [`Operation`] to the top-level encrypted folder at `path`
pub struct UpdateFolderUsersJob {
    api: Arc<dyn E2eeApi>,
    journal: Arc<dyn SyncJournal>,
    account: Arc<Account>,
    path: String,
    operation: Operation,
}

impl UpdateFolderUsersJob {
    pub fn new(
        api: Arc<dyn E2eeApi>,
        journal: Arc<dyn SyncJournal>,
        account: Arc<Account>,
        path: impl Into<String>,
        operation: Operation,
    ) -> Self {
        Self {
            api,
            journal,
            account,
            path: path.into(),
            operation,
        }
    }

    #[instrument(skip(self), fields(path = %self.path, operation = ?self.operation))]
    pub async fn run(self) -> Result<()> {
        if let Some(top) = self.journal.top_level_e2ee_folder_record(&self.path)? {
            if top.path != self.path {
                return Err(ClientError::InvalidState(format!(
                    "{} is nested in {}, membership lives on the top-level folder",
                    self.path, top.path
                )));
            }
        }

        let certificate = match &self.operation {
            Operation::Add {
                user_id,
                certificate_pem: None,
            } => Some(self.api.user_certificate(user_id).await?),
            Operation::Add {
                certificate_pem: Some(pem),
                ..
            } => Some(pem.clone()),
            _ => None,
        };

        let mut handler = FolderMetadataHandler::new(
            self.api.clone(),
            self.account.clone(),
            self.path.clone(),
            RootEncryptedFolderInfo::root(),
        );
        handler.fetch_metadata(false).await?;

        let metadata = handler.require_metadata_mut()?;
        let key_for_decryption = metadata
            .metadata_key_for_decryption()
            .cloned()
            .ok_or_else(|| ClientError::InvalidState("metadata has no decryption key".to_string()))?;
        match (&self.operation, certificate) {
            (Operation::Add { user_id, .. }, Some(pem)) => metadata.add_user(user_id, &pem)?,
            (Operation::Remove { user_id }, _) => metadata.remove_user(user_id)?,
            _ => metadata.rotate_metadata_key()?,
        }
        let key_for_encryption = metadata
            .metadata_key_for_encryption()
            .cloned()
            .ok_or_else(|| ClientError::InvalidState("metadata has no encryption key".to_string()))?;
        let key_checksums = metadata.all_key_checksums();

        handler.upload_metadata(true).await?;
        let root_status = handler
            .metadata()
            .map(|metadata| metadata.encrypted_metadata_encryption_status())
            .unwrap_or_default();
        let root_id = handler.folder_id().unwrap_or_default().to_string();
        let token = handler
            .folder_token()
            .ok_or_else(|| ClientError::InvalidState("lock token lost after upload".to_string()))?
            .to_string();

        let mut queue = match self.nested_folders(&key_for_encryption, &key_for_decryption, &key_checksums) {
            Ok(queue) => queue,
            Err(e) => {
                if let Err(unlock_error) = handler.unlock_folder().await {
                    warn!(error = %unlock_error, "unlock after journal failure also failed");
                }
                return Err(e);
            }
        };
        info!(nested = queue.len(), "re-encrypting nested folders");

        let mut statuses = vec![(self.path.clone(), root_id, root_status)];
        while let Some(task) = queue.pop_front() {
            match self.re_encrypt(&task, &token).await {
                Ok(status) => statuses.push((task.path, task.folder_id, status)),
                Err(e) => {
                    warn!(path = %task.path, skipped = queue.len(), "nested re-encryption failed, abandoning queue");
                    queue.clear();
                    if let Err(unlock_error) = handler.unlock_folder().await {
                        warn!(error = %unlock_error, "unlock after failed re-encryption also failed");
                    }
                    return Err(ClientError::SubTaskFailed {
                        path: task.path,
                        source: Box::new(e),
                    });
                }
            }
        }

        handler.unlock_folder().await?;
        for (path, folder_id, status) in statuses {
            self.journal.set_encryption_status(&path, &folder_id, status)?;
        }
        Ok(())
    }

    fn nested_folders(
        &self,
        key_for_encryption: &MetadataKey,
        key_for_decryption: &MetadataKey,
        key_checksums: &BTreeSet<String>,
    ) -> Result<VecDeque<ReEncryptTask>> {
        Ok(self
            .journal
            .files_below_path(&self.path)?
            .into_iter()
            .filter(|record| record.is_directory && record.is_e2e_encrypted())
            .map(|record| ReEncryptTask {
                path: record.path,
                folder_id: record.file_id,
                key_for_encryption: key_for_encryption.clone(),
                key_for_decryption: key_for_decryption.clone(),
                key_checksums: key_checksums.clone(),
            })
            .collect())
    }

    async fn re_encrypt(&self, task: &ReEncryptTask, token: &str) -> Result<EncryptionStatus> {
        debug!(path = %task.path, "re-encrypting nested folder");
        let root_info = RootEncryptedFolderInfo::with_keys(
            self.path.clone(),
            task.key_for_encryption.clone(),
            task.key_for_decryption.clone(),
            task.key_checksums.clone(),
        );
        let mut handler = FolderMetadataHandler::new(self.api.clone(), self.account.clone(), task.path.clone(), root_info)
            .with_folder_id(task.folder_id.clone());
        handler.set_folder_token(token);
        handler.fetch_metadata(false).await?;
        handler.upload_metadata(true).await?;

        Ok(handler
            .metadata()
            .map(|metadata| metadata.encrypted_metadata_encryption_status())
            .unwrap_or_default())
    }
}
