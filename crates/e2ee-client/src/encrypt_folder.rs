//! Turning a plain folder into an encrypted one

use crate::{journal::parent_path, ClientError, E2eeApi, FolderMetadataHandler, Result, SyncJournal};
use e2ee_metadata::{Account, EncryptionStatus, RootEncryptedFolderInfo};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Encrypts the empty folder at `path`.
///
/// Inside an already encrypted folder the new folder becomes a nested one
/// and shares its top-level folder's key; otherwise it becomes a top-level
/// folder with the account as its only member.
pub struct EncryptFolderJob {
    api: Arc<dyn E2eeApi>,
    journal: Arc<dyn SyncJournal>,
    account: Arc<Account>,
    path: String,
}

impl EncryptFolderJob {
    pub fn new(api: Arc<dyn E2eeApi>, journal: Arc<dyn SyncJournal>, account: Arc<Account>, path: impl Into<String>) -> Self {
        Self {
            api,
            journal,
            account,
            path: path.into(),
        }
    }

    /// Run the job and return the resulting encryption status
    #[instrument(skip(self), fields(path = %self.path))]
    pub async fn run(self) -> Result<EncryptionStatus> {
        let folder_id = self.api.folder_id(&self.path).await?;
        self.api.set_encryption_flag(&folder_id).await?;

        let initial_status = EncryptionStatus::from(self.account.latest_supported_metadata_version());
        self.journal
            .set_encryption_status(&self.path, &folder_id, initial_status)?;

        let root_info = match parent_path(&self.path) {
            Some(parent) => match self.journal.top_level_e2ee_folder_record(parent)? {
                Some(top) => RootEncryptedFolderInfo::new(top.path),
                None => RootEncryptedFolderInfo::root(),
            },
            None => RootEncryptedFolderInfo::root(),
        };

        let mut handler = FolderMetadataHandler::new(self.api.clone(), self.account.clone(), self.path.clone(), root_info)
            .with_folder_id(folder_id.clone());
        handler.lock_folder().await?;
        if let Err(e) = handler.create_empty_metadata().await {
            if let Err(unlock_error) = handler.unlock_folder().await {
                warn!(error = %unlock_error, "unlock after failed metadata creation also failed");
            }
            return Err(e);
        }
        handler.upload_metadata(false).await?;

        let status = handler
            .metadata()
            .map(|metadata| metadata.encrypted_metadata_encryption_status())
            .ok_or_else(|| ClientError::InvalidState("metadata vanished after upload".to_string()))?;
        self.journal.set_encryption_status(&self.path, &folder_id, status)?;
        info!(?status, "folder encrypted");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApiCall, MemoryE2eeServer, MemoryJournal};
    use e2ee_metadata::{testing, AccountConfig, FolderMetadata};

    fn job(server: &MemoryE2eeServer, journal: &MemoryJournal, account: Arc<Account>, path: &str) -> EncryptFolderJob {
        EncryptFolderJob::new(Arc::new(server.clone()), Arc::new(journal.clone()), account, path)
    }

    #[test_log::test(tokio::test)]
    async fn test_encrypt_top_level_folder() {
        let server = MemoryE2eeServer::new();
        let journal = MemoryJournal::new();
        let id = server.add_folder("/Secret");

        let status = job(&server, &journal, testing::account("alice"), "/Secret").run().await.unwrap();

        assert_eq!(status, EncryptionStatus::EncryptedMigratedV2_0);
        assert!(server.is_encrypted(&id));
        assert!(!server.is_locked(&id));
        let metadata = FolderMetadata::from_bytes(
            testing::account("alice"),
            &server.metadata(&id).unwrap(),
            RootEncryptedFolderInfo::root(),
        )
        .unwrap();
        assert_eq!(metadata.folder_user_ids(), vec!["alice"]);
        assert_eq!(journal.file_record("/Secret").unwrap().unwrap().encryption_status, status);
        assert!(server.calls().contains(&ApiCall::StoreMetadata { folder_id: id.clone() }));
    }

    #[test_log::test(tokio::test)]
    async fn test_encrypt_on_legacy_server() {
        let server = MemoryE2eeServer::new();
        let journal = MemoryJournal::new();
        server.add_folder("/Secret");
        let account = testing::account_with("alice", AccountConfig::new("alice").with_e2ee_version(1.2));

        let status = job(&server, &journal, account, "/Secret").run().await.unwrap();
        assert_eq!(status, EncryptionStatus::EncryptedMigratedV1_2);
    }

    #[test_log::test(tokio::test)]
    async fn test_nested_folder_uses_top_level_key() {
        let server = MemoryE2eeServer::new();
        let journal = MemoryJournal::new();
        let root_id = server.add_folder("/Secret");
        let nested_id = server.add_folder("/Secret/nested");
        job(&server, &journal, testing::account("alice"), "/Secret").run().await.unwrap();

        job(&server, &journal, testing::account("alice"), "/Secret/nested").run().await.unwrap();

        let root = FolderMetadata::from_bytes(
            testing::account("alice"),
            &server.metadata(&root_id).unwrap(),
            RootEncryptedFolderInfo::root(),
        )
        .unwrap();
        let key = root.metadata_key_for_encryption().cloned().unwrap();
        let info = RootEncryptedFolderInfo::with_keys("/Secret", key.clone(), key, root.key_checksums().clone());
        let nested = FolderMetadata::from_bytes(testing::account("alice"), &server.metadata(&nested_id).unwrap(), info).unwrap();
        assert!(!nested.is_root_encrypted_folder());
        assert!(nested.folder_user_ids().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_locked_folder_is_not_encrypted() {
        let server = MemoryE2eeServer::new();
        let journal = MemoryJournal::new();
        let id = server.add_folder("/Secret");
        let token = server.lock_folder(&id, "pem", None).await.unwrap();

        let result = job(&server, &journal, testing::account("alice"), "/Secret").run().await;
        assert!(result.unwrap_err().is_locked());
        assert!(server.metadata(&id).is_none());

        server.unlock_folder(&id, &token).await.unwrap();
    }
}
