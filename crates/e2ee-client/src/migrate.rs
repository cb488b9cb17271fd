//! Upgrading legacy folder metadata to the server's newest version

use crate::{
    users::{Operation, UpdateFolderUsersJob},
    ClientError, E2eeApi, FolderMetadataHandler, Result, SyncJournal,
};
use e2ee_metadata::{Account, EncryptionStatus, MetadataVersion, RootEncryptedFolderInfo};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Rewrites the metadata of the encrypted folder at `path` in the newest
/// version the server supports.
///
/// A top-level folder is migrated by adding the account as a member, which
/// also re-encrypts every nested folder. A nested folder is re-uploaded
/// with its top-level folder's key, after migrating a legacy top-level
/// folder first.
pub struct UpdateMigratedMetadataJob {
    api: Arc<dyn E2eeApi>,
    journal: Arc<dyn SyncJournal>,
    account: Arc<Account>,
    path: String,
}

impl UpdateMigratedMetadataJob {
    pub fn new(api: Arc<dyn E2eeApi>, journal: Arc<dyn SyncJournal>, account: Arc<Account>, path: impl Into<String>) -> Self {
        Self {
            api,
            journal,
            account,
            path: path.into(),
        }
    }

    #[instrument(skip(self), fields(path = %self.path))]
    pub async fn run(self) -> Result<()> {
        let root_info = self.journal.root_info_for(&self.path)?;
        if root_info.is_root() {
            info!("migrating top-level folder");
            return self.migrate_top_level(&self.path).await;
        }

        info!(root = %root_info.path, "migrating nested folder");
        if self.account.latest_supported_metadata_version() >= MetadataVersion::V2_0 {
            self.ensure_top_level_migrated(&root_info.path).await?;
        }

        let mut handler = FolderMetadataHandler::new(self.api.clone(), self.account.clone(), self.path.clone(), root_info);
        handler.fetch_metadata(false).await?;
        let status = match handler.metadata() {
            // Re-encrypted by the top-level migration
            Some(metadata) if metadata.existing_metadata_version() >= self.account.latest_supported_metadata_version() => {
                debug!("nested folder is already migrated");
                EncryptionStatus::from(metadata.existing_metadata_version())
            }
            _ => {
                handler.upload_metadata(false).await?;
                handler
                    .metadata()
                    .map(|metadata| metadata.encrypted_metadata_encryption_status())
                    .ok_or_else(|| ClientError::InvalidState("metadata vanished after upload".to_string()))?
            }
        };
        let folder_id = handler.folder_id().unwrap_or_default().to_string();
        self.journal.set_encryption_status(&self.path, &folder_id, status)
    }

    /// Migrate the top-level folder at `path` by adding the account as a member
    async fn migrate_top_level(&self, path: &str) -> Result<()> {
        let add_self = Operation::Add {
            user_id: self.account.user_id().to_string(),
            certificate_pem: Some(self.account.certificate().pem().to_string()),
        };
        UpdateFolderUsersJob::new(self.api.clone(), self.journal.clone(), self.account.clone(), path, add_self)
            .run()
            .await
    }

    /// Nested 2.0 metadata is encrypted with the top-level key, which a
    /// legacy top-level folder does not have yet
    async fn ensure_top_level_migrated(&self, top_path: &str) -> Result<()> {
        let mut top = FolderMetadataHandler::new(
            self.api.clone(),
            self.account.clone(),
            top_path.to_string(),
            RootEncryptedFolderInfo::root(),
        );
        top.fetch_metadata(false).await?;
        if top.metadata().is_some_and(|metadata| metadata.is_version_2_and_up()) {
            return Ok(());
        }
        drop(top);

        info!(top_level = %top_path, "migrating legacy top-level folder first");
        self.migrate_top_level(top_path).await
    }
}
