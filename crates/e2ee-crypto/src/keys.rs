//! Key material for encrypted folders
//!
//! - `MetadataKey`: the symmetric key protecting one folder tree's metadata
//! - `PrivateKey` / `PublicKey`: the account's RSA key pair used to wrap
//!   metadata keys per folder user

use crate::{CryptoError, Result};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a metadata key in bytes (AES-128)
pub const KEY_SIZE: usize = 16;

/// Size of a nonce in bytes. The wire format uses 16-byte GCM IVs.
pub const NONCE_SIZE: usize = 16;

/// Size of the GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Fill a buffer of `len` bytes from the OS random source
pub fn generate_random(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
    bytes
}

/// Symmetric key protecting a folder's metadata
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MetadataKey {
    key: [u8; KEY_SIZE],
}

impl MetadataKey {
    /// Generate a new random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut key);
        Self { key }
    }

    /// Create a key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "metadata key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for MetadataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MetadataKey([REDACTED])")
    }
}

/// RSA public key used to wrap metadata keys
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl PublicKey {
    /// Parse a DER-encoded SubjectPublicKeyInfo
    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        let inner = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Encode as a PEM `PUBLIC KEY` block, the form the lock endpoint expects
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    pub(crate) fn as_rsa(&self) -> &RsaPublicKey {
        &self.inner
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use rsa::traits::PublicKeyParts;
        write!(f, "PublicKey(rsa-{})", self.inner.size() * 8)
    }
}

/// The account's RSA private key
#[derive(Clone)]
pub struct PrivateKey {
    inner: RsaPrivateKey,
}

impl PrivateKey {
    /// Generate a new RSA key of the given modulus size
    pub fn generate(bits: usize) -> Result<Self> {
        let inner = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Parse a PEM private key, PKCS#8 (`PRIVATE KEY`) or PKCS#1 (`RSA PRIVATE KEY`)
    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Encode as PKCS#8 PEM
    pub fn to_pem(&self) -> Result<String> {
        use rsa::pkcs8::EncodePrivateKey;
        let pem = self
            .inner
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(pem.to_string())
    }

    /// The matching public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.to_public_key(),
        }
    }

    pub(crate) fn as_rsa(&self) -> &RsaPrivateKey {
        &self.inner
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_key_generation() {
        let a = MetadataKey::generate();
        let b = MetadataKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_metadata_key_rejects_wrong_length() {
        assert!(MetadataKey::from_bytes(&[0u8; 15]).is_err());
        assert!(MetadataKey::from_bytes(&[0u8; 32]).is_err());
        assert!(MetadataKey::from_bytes(&[7u8; KEY_SIZE]).is_ok());
    }

    #[test]
    fn test_generate_random_length() {
        assert_eq!(generate_random(0).len(), 0);
        assert_eq!(generate_random(33).len(), 33);
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = MetadataKey::from_bytes(&[0xAB; KEY_SIZE]).unwrap();
        assert_eq!(format!("{:?}", key), "MetadataKey([REDACTED])");
    }

    #[test]
    fn test_private_key_pem_roundtrip() {
        let key = PrivateKey::generate(1024).unwrap();
        let pem = key.to_pem().unwrap();
        let parsed = PrivateKey::from_pem(&pem).unwrap();
        assert_eq!(parsed.public_key(), key.public_key());
        assert!(key.public_key().to_pem().unwrap().starts_with("-----BEGIN PUBLIC KEY-----"));
    }

    #[test]
    fn test_private_key_rejects_garbage() {
        assert!(PrivateKey::from_pem("not a key").is_err());
    }
}
