//! Client error types

use e2ee_metadata::MetadataError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// An endpoint answered with a failure status
    #[error("HTTP error ({status}): {message}")]
    Http { status: u16, message: String },

    /// Metadata could not be parsed, mutated or serialized
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Encryption error
    #[error("Encryption error: {0}")]
    Encryption(#[from] e2ee_crypto::CryptoError),

    /// The local journal could not be read or written
    #[error("Journal error: {0}")]
    Journal(String),

    /// An operation was requested in a state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The server answered with an empty metadata document
    #[error("Folder {0} has empty metadata")]
    EmptyMetadata(String),

    /// No entry with this name exists in the folder metadata
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Re-encrypting a nested folder failed, the remaining ones were skipped
    #[error("Re-encrypting {path} failed: {source}")]
    SubTaskFailed {
        path: String,
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// An HTTP failure with `status`
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// The HTTP status carried by this error, looking through sub-task failures
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::SubTaskFailed { source, .. } => source.status_code(),
            _ => None,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EntryNotFound(_)) || self.status_code() == Some(404)
    }

    /// Check if the folder was locked by someone else
    pub fn is_locked(&self) -> bool {
        self.status_code() == Some(423)
    }
}
