//! # E2EE Folders
//!
//! End-to-end encrypted folder metadata for a file sync client.
//!
//! - [`crypto`]: AES-GCM, RSA-OAEP key wrapping, certificates and checksums
//! - [`metadata`]: the folder metadata model and its v1.0, v1.2 and v2.0 codecs
//! - [`client`]: jobs running the lock/fetch/upload/unlock protocol
//!
//! Run the offline walkthrough with: cargo run --example shared_folder

pub use e2ee_client as client;
pub use e2ee_crypto as crypto;
pub use e2ee_metadata as metadata;

pub use e2ee_client::{
    ClientError, E2eeApi, EncryptFolderJob, FolderMetadataHandler, Operation, RemoveEncryptedEntryJob, SyncJournal,
    UpdateFolderUsersJob, UpdateMigratedMetadataJob,
};
pub use e2ee_metadata::{Account, AccountConfig, EncryptedFile, FolderMetadata, MetadataError, MetadataVersion};
