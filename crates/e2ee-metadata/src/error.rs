//! Error types for folder metadata

use crate::version::MetadataVersion;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Errors raised while parsing, mutating or serializing folder metadata
#[derive(Error, Debug)]
pub enum MetadataError {
    /// Underlying cryptographic failure
    #[error("crypto error: {0}")]
    Crypto(#[from] e2ee_crypto::CryptoError),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A base64 field did not decode
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Document structure is not what its version requires
    #[error("invalid metadata document: {0}")]
    InvalidDocument(String),

    /// The document's version is unknown
    #[error("unsupported metadata version: {0}")]
    UnsupportedVersion(String),

    /// Writing would downgrade a folder already on a newer version
    #[error("refusing to downgrade metadata from {existing:?} to {target:?}")]
    DowngradeRefused {
        existing: MetadataVersion,
        target: MetadataVersion,
    },

    /// Operation only allowed on the top-level encrypted folder
    #[error("{0} is only allowed on the top-level encrypted folder")]
    NotRootFolder(&'static str),

    /// The users array violates the root/non-root rule
    #[error("invalid users array: {0}")]
    InvalidUsers(String),

    /// The current user has no entry in the users array
    #[error("user {0} is not a member of this folder")]
    NotAFolderUser(String),

    /// No metadata key could be recovered or supplied
    #[error("missing metadata key")]
    MissingMetadataKey,

    /// The metadata key does not match any known checksum
    #[error("metadata key does not match the folder's key checksums")]
    KeyVerification,

    /// The legacy checksum does not match
    #[error("metadata checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The model was used before setup succeeded
    #[error("metadata is not valid")]
    NotValid,

    /// A certificate or user id argument was rejected
    #[error("invalid user: {0}")]
    InvalidUser(String),

    /// A file entry argument was rejected
    #[error("invalid file entry: {0}")]
    InvalidFile(String),
}
