//! # E2EE Crypto
//!
//! Cryptographic primitives for end-to-end encrypted folders.
//!
//! This crate provides:
//! - **AES-128-GCM**: authenticated encryption of metadata, with optional gzip framing
//! - **RSA-OAEP**: per-user wrapping of the shared metadata key
//! - **Certificates**: public key extraction from X.509 PEM certificates
//! - **Checksums**: key fingerprints and the legacy metadata checksum
//!
//! ## Example
//!
//! ```rust,ignore
//! use e2ee_crypto::{MetadataKey, symmetric};
//!
//! let key = MetadataKey::generate();
//! let sealed = symmetric::gzip_then_encrypt(&key, b"{\"files\":{}}")?;
//! let plain = symmetric::decrypt_then_gunzip(&key, &sealed.nonce, &sealed.ciphertext, sealed.tag())?;
//! ```

pub mod asymmetric;
pub mod certificate;
pub mod error;
pub mod hashing;
pub mod keys;
pub mod symmetric;

pub use certificate::Certificate;
pub use error::{CryptoError, Result};
pub use hashing::{fingerprint_in_set, key_fingerprint, legacy_metadata_checksum, sha256_hex};
pub use keys::{generate_random, MetadataKey, PrivateKey, PublicKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use symmetric::{Aead, Nonce, Sealed};
