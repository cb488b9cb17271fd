//! # E2EE Client
//!
//! Jobs that read and write end-to-end encrypted folder metadata on the
//! server.
//!
//! ## Features
//!
//! - **Locking**: every metadata write happens under the folder's server lock,
//!   released on success, failure and drop
//! - **Membership**: adding or removing a member rotates the key and
//!   re-encrypts every nested folder under a single lock
//! - **Migration**: legacy metadata is rewritten in the server's newest version
//! - **Test doubles**: in-memory server and journal
//!
//! ## Example
//!
//! ```rust,ignore
//! use e2ee_client::{MemoryE2eeServer, MemoryJournal, Operation, UpdateFolderUsersJob};
//! use std::sync::Arc;
//!
//! let job = UpdateFolderUsersJob::new(
//!     Arc::new(server),
//!     Arc::new(journal),
//!     account,
//!     "/Secret",
//!     Operation::Add { user_id: "bob".into(), certificate_pem: None },
//! );
//! job.run().await?;
//! ```

mod encrypt_folder;
mod error;
mod handler;
pub mod journal;
mod memory;
mod migrate;
mod remote;
mod remove_entry;
mod users;

pub use encrypt_folder::EncryptFolderJob;
pub use error::{ClientError, Result};
pub use handler::{FolderMetadataHandler, HandlerState};
pub use journal::{JournalRecord, MemoryJournal, SyncJournal};
pub use memory::{ApiCall, MemoryE2eeServer};
pub use migrate::UpdateMigratedMetadataJob;
pub use remote::{ApiRootMetadataSource, E2eeApi};
pub use remove_entry::RemoveEncryptedEntryJob;
pub use users::{Operation, UpdateFolderUsersJob};
