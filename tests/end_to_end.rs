//! End-to-end tests for encrypted folders
//!
//! These tests drive the public jobs against the in-memory server and
//! journal, the same way a sync client would.

use e2ee_folders::client::{ApiRootMetadataSource, JournalRecord, MemoryE2eeServer, MemoryJournal};
use e2ee_folders::metadata::{testing, AccountConfig, EncryptionStatus, RootEncryptedFolderInfo};
use e2ee_folders::{
    E2eeApi, EncryptFolderJob, EncryptedFile, FolderMetadata, FolderMetadataHandler, Operation,
    RemoveEncryptedEntryJob, SyncJournal, UpdateFolderUsersJob, UpdateMigratedMetadataJob,
};
use std::sync::Arc;

fn report(encrypted_filename: &str) -> EncryptedFile {
    EncryptedFile {
        encryption_key: vec![0x11; 16],
        mimetype: "application/pdf".to_string(),
        initialization_vector: vec![0x22; 16],
        authentication_tag: vec![0x33; 16],
        encrypted_filename: encrypted_filename.to_string(),
        original_filename: "report.pdf".to_string(),
    }
}

/// Test sharing a folder tree, reading it as the new member and deleting
/// an entry afterwards
#[test_log::test(tokio::test)]
async fn test_shared_folder_lifecycle() -> anyhow::Result<()> {
    let server = MemoryE2eeServer::new();
    let journal = Arc::new(MemoryJournal::new());
    let api: Arc<dyn E2eeApi> = Arc::new(server.clone());

    let team_id = server.add_folder("/Team");
    let docs_id = server.add_folder("/Team/docs");
    for path in ["/Team", "/Team/docs"] {
        let status = EncryptFolderJob::new(api.clone(), journal.clone(), testing::account("alice"), path)
            .run()
            .await?;
        assert_eq!(status, EncryptionStatus::EncryptedMigratedV2_0);
    }

    // Add a file to the nested folder
    server.add_file("/Team/docs/c0ffee");
    let mut handler = FolderMetadataHandler::new(
        api.clone(),
        testing::account("alice"),
        "/Team/docs",
        journal.root_info_for("/Team/docs")?,
    );
    handler.fetch_metadata(false).await?;
    handler.require_metadata_mut()?.add_encrypted_file(report("c0ffee"))?;
    handler.upload_metadata(false).await?;

    // Share with bob, whose certificate the server knows
    server.add_certificate("bob", testing::identity("bob").certificate.pem());
    let share = Operation::Add {
        user_id: "bob".to_string(),
        certificate_pem: None,
    };
    UpdateFolderUsersJob::new(api.clone(), journal.clone(), testing::account("alice"), "/Team", share)
        .run()
        .await?;

    let source = ApiRootMetadataSource::new(api.clone());
    let bytes = server.metadata(&docs_id).unwrap_or_default();
    let as_bob = FolderMetadata::load(testing::account("bob"), &bytes, RootEncryptedFolderInfo::new("/Team"), &source).await?;
    assert_eq!(as_bob.file("report.pdf"), Some(&report("c0ffee")));

    // Delete the file again
    RemoveEncryptedEntryJob::new(api.clone(), journal.clone(), testing::account("bob"), "/Team/docs", "report.pdf")
        .run()
        .await?;

    assert!(!server.exists("/Team/docs/c0ffee"));
    assert!(!server.is_locked(&team_id));
    assert!(!server.is_locked(&docs_id));
    let bytes = server.metadata(&docs_id).unwrap_or_default();
    let as_alice =
        FolderMetadata::load(testing::account("alice"), &bytes, RootEncryptedFolderInfo::new("/Team"), &source).await?;
    assert!(as_alice.files().is_empty());
    Ok(())
}

/// Test that a folder written by a v1.2 client is readable after migration
#[test_log::test(tokio::test)]
async fn test_legacy_folder_migration() -> anyhow::Result<()> {
    let server = MemoryE2eeServer::new();
    let journal = Arc::new(MemoryJournal::new());
    let api: Arc<dyn E2eeApi> = Arc::new(server.clone());
    let id = server.add_folder("/Archive");

    let legacy_account = testing::account_with("alice", AccountConfig::new("alice").with_e2ee_version(1.2));
    let mut legacy = FolderMetadata::empty(legacy_account)?;
    legacy.add_encrypted_file(report("0ddba11"))?;
    server.put_metadata(&id, legacy.encrypted_metadata()?.into());
    journal.set_file_record(
        JournalRecord::directory("/Archive", &id).with_encryption_status(EncryptionStatus::EncryptedMigratedV1_2),
    )?;

    UpdateMigratedMetadataJob::new(api, journal.clone(), testing::account("alice"), "/Archive")
        .run()
        .await?;

    let migrated = FolderMetadata::from_bytes(
        testing::account("alice"),
        &server.metadata(&id).unwrap_or_default(),
        RootEncryptedFolderInfo::root(),
    )?;
    assert!(migrated.is_version_2_and_up());
    assert_eq!(migrated.folder_user_ids(), vec!["alice"]);
    assert_eq!(migrated.file("report.pdf"), Some(&report("0ddba11")));
    assert_eq!(
        journal.file_record("/Archive")?.map(|record| record.encryption_status),
        Some(EncryptionStatus::EncryptedMigratedV2_0)
    );
    assert!(!server.is_locked(&id));
    Ok(())
}
