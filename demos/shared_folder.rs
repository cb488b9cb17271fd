//! Sharing an encrypted folder, entirely in memory
//!
//! This example demonstrates:
//! - Encrypting a top-level folder and a nested folder
//! - Adding a file entry under the folder lock
//! - Sharing with a second user, which re-encrypts the nested folder
//! - Revoking that user again
//!
//! Run with: cargo run --example shared_folder

use e2ee_folders::{
    client::{ApiRootMetadataSource, MemoryE2eeServer, MemoryJournal},
    metadata::{testing, RootEncryptedFolderInfo},
    EncryptFolderJob, EncryptedFile, FolderMetadata, FolderMetadataHandler, Operation, UpdateFolderUsersJob,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🔐 E2EE Folders - Shared Folder Example\n");

    let server = MemoryE2eeServer::new();
    let journal = Arc::new(MemoryJournal::new());
    let alice = testing::account("alice");
    let bob = testing::account("bob");
    server.add_certificate("bob", bob.certificate().pem());

    // ==================== Encrypt ====================

    let mut ids = Vec::new();
    for path in ["/Photos", "/Photos/2024"] {
        ids.push(server.add_folder(path));
        let status = EncryptFolderJob::new(Arc::new(server.clone()), journal.clone(), alice.clone(), path)
            .run()
            .await?;
        println!("📁 Encrypted {path} ({status:?})");
    }

    // ==================== Add a file ====================

    let root_info = RootEncryptedFolderInfo::new("/Photos");
    let mut handler = FolderMetadataHandler::new(Arc::new(server.clone()), alice.clone(), "/Photos/2024", root_info);
    handler.fetch_metadata(false).await?;
    handler.require_metadata_mut()?.add_encrypted_file(EncryptedFile {
        encryption_key: e2ee_folders::crypto::generate_random(16),
        mimetype: "image/jpeg".to_string(),
        initialization_vector: e2ee_folders::crypto::generate_random(16),
        authentication_tag: e2ee_folders::crypto::generate_random(16),
        encrypted_filename: "9f86d081884c7d65".to_string(),
        original_filename: "beach.jpg".to_string(),
    })?;
    handler.upload_metadata(false).await?;
    println!("📤 Added beach.jpg to /Photos/2024");

    // ==================== Share ====================

    let share = Operation::Add {
        user_id: "bob".to_string(),
        certificate_pem: None,
    };
    UpdateFolderUsersJob::new(Arc::new(server.clone()), journal.clone(), alice.clone(), "/Photos", share)
        .run()
        .await?;
    println!("🤝 Shared /Photos with bob");

    let nested_id = &ids[1];
    let bytes = server.metadata(nested_id).unwrap_or_default();
    let source = ApiRootMetadataSource::new(Arc::new(server.clone()));
    let as_bob = FolderMetadata::load(bob.clone(), &bytes, RootEncryptedFolderInfo::new("/Photos"), &source).await?;
    for file in as_bob.files() {
        println!("   👀 bob sees {} ({})", file.original_filename, file.mimetype);
    }

    // ==================== Revoke ====================

    let revoke = Operation::Remove {
        user_id: "bob".to_string(),
    };
    UpdateFolderUsersJob::new(Arc::new(server.clone()), journal.clone(), alice, "/Photos", revoke)
        .run()
        .await?;

    let bytes = server.metadata(nested_id).unwrap_or_default();
    match FolderMetadata::load(bob, &bytes, RootEncryptedFolderInfo::new("/Photos"), &source).await {
        Ok(_) => println!("⚠️  bob can still read /Photos/2024"),
        Err(e) => println!("🚫 bob was revoked: {e}"),
    }

    Ok(())
}
