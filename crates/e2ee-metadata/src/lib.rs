//! # E2EE Metadata
//!
//! The metadata of an end-to-end encrypted folder: which encrypted names map
//! to which files, the per-file keys, and who may read it.
//!
//! Three document versions are understood:
//! - **1.0 / 1.2**: one metadata key wrapped for the account, every file
//!   entry encrypted on its own
//! - **2.0**: the whole file list gzip-compressed and encrypted with a shared
//!   metadata key, wrapped per member of the top-level folder
//!
//! Writing always targets the highest version the server supports, so
//! reading a legacy folder and writing it back migrates it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use e2ee_metadata::{FolderMetadata, RootEncryptedFolderInfo};
//!
//! let mut metadata = FolderMetadata::from_bytes(account, &bytes, RootEncryptedFolderInfo::root())?;
//! metadata.add_user("bob", &bob_certificate_pem)?;
//! let upload = metadata.encrypted_metadata()?;
//! ```

pub mod account;
mod codec;
pub mod error;
pub mod file;
pub mod folder;
pub mod version;
mod wire;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use account::{Account, AccountConfig};
pub use error::{MetadataError, Result};
pub use file::{EncryptedFile, DIRECTORY_MIMETYPE, INODE_DIRECTORY_MIMETYPE};
pub use folder::{FolderMetadata, FolderUser, RootEncryptedFolderInfo, RootMetadataSource, ROOT_PATH};
pub use version::{EncryptionStatus, MetadataVersion};
pub use wire::CipherEnvelope;
