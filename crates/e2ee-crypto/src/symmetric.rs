//! Symmetric encryption using AES-128-GCM with 16-byte nonces
//!
//! Ciphertexts are laid out as `ciphertext || tag`. Metadata documents also
//! carry the tag on its own, so decryption can be asked to check both agree.

use crate::{
    keys::{MetadataKey, NONCE_SIZE, TAG_SIZE},
    CryptoError, Result,
};
use aes_gcm::{
    aead::{consts::U16, Aead as AeadTrait, KeyInit},
    aes::Aes128,
    AesGcm,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use rand::rngs::OsRng;
use std::io::{Read, Write};
use subtle::ConstantTimeEq;

type Aes128Gcm16 = AesGcm<Aes128, U16>;

/// Separator between ciphertext and IV in the legacy string framing
const LEGACY_SEPARATOR: char = '|';

/// A nonce for AEAD encryption
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl Nonce {
    /// Generate a random nonce
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonce(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; NONCE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the nonce bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    /// Decode from base64
    pub fn from_base64(s: &str) -> Result<Self> {
        Self::from_bytes(&STANDARD.decode(s)?)
    }
}

/// Output of an encryption: the nonce used and `ciphertext || tag`
#[derive(Clone, Debug)]
pub struct Sealed {
    pub nonce: Nonce,
    pub ciphertext: Vec<u8>,
}

impl Sealed {
    /// The trailing authentication tag
    pub fn tag(&self) -> &[u8] {
        &self.ciphertext[self.ciphertext.len().saturating_sub(TAG_SIZE)..]
    }
}

/// AEAD encryption/decryption interface
pub struct Aead {
    key: [u8; 16],
}

impl Drop for Aead {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.key);
    }
}

impl Aead {
    /// Create a new AEAD instance with the given key
    pub fn new(key: &MetadataKey) -> Self {
        Self { key: *key.as_bytes() }
    }

    fn cipher(&self) -> Result<Aes128Gcm16> {
        Aes128Gcm16::new_from_slice(&self.key).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Encrypt data with the given nonce, returning `ciphertext || tag`
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce_arr = aes_gcm::Nonce::<U16>::from_slice(nonce.as_bytes());
        self.cipher()?
            .encrypt(nonce_arr, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Decrypt `ciphertext || tag` with the given nonce
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::InvalidCiphertext(format!(
                "ciphertext shorter than the {}-byte tag",
                TAG_SIZE
            )));
        }
        let nonce_arr = aes_gcm::Nonce::<U16>::from_slice(nonce.as_bytes());
        self.cipher()?
            .decrypt(nonce_arr, ciphertext)
            .map_err(|e| CryptoError::Decryption(e.to_string()))
    }

    /// Decrypt, additionally requiring the trailing tag to equal `tag`
    pub fn decrypt_with_tag(&self, nonce: &Nonce, ciphertext: &[u8], tag: &[u8]) -> Result<Vec<u8>> {
        if tag.len() != TAG_SIZE || ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::TagMismatch);
        }
        let trailing = &ciphertext[ciphertext.len() - TAG_SIZE..];
        if !bool::from(trailing.ct_eq(tag)) {
            return Err(CryptoError::TagMismatch);
        }
        self.decrypt(nonce, ciphertext)
    }
}

/// Encrypt data with a generated nonce
pub fn encrypt(key: &MetadataKey, plaintext: &[u8]) -> Result<Sealed> {
    let nonce = Nonce::generate();
    let ciphertext = Aead::new(key).encrypt(&nonce, plaintext)?;
    Ok(Sealed { nonce, ciphertext })
}

/// Decrypt data (convenience function)
pub fn decrypt(key: &MetadataKey, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
    Aead::new(key).decrypt(nonce, ciphertext)
}

/// gzip the plaintext, then encrypt it under a fresh nonce
pub fn gzip_then_encrypt(key: &MetadataKey, plaintext: &[u8]) -> Result<Sealed> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(plaintext)?;
    let compressed = encoder.finish()?;
    encrypt(key, &compressed)
}

/// Decrypt a gzip-framed blob and inflate it
pub fn decrypt_then_gunzip(
    key: &MetadataKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>> {
    let compressed = Aead::new(key).decrypt_with_tag(nonce, ciphertext, tag)?;
    let mut plaintext = Vec::new();
    GzDecoder::new(compressed.as_slice()).read_to_end(&mut plaintext)?;
    Ok(plaintext)
}

/// Encrypt into the legacy `base64(ciphertext||tag)|base64(iv)` string form.
/// The plaintext is base64 encoded before encryption.
pub fn encrypt_legacy_string(key: &MetadataKey, plaintext: &[u8]) -> Result<String> {
    let sealed = encrypt(key, STANDARD.encode(plaintext).as_bytes())?;
    Ok(format!(
        "{}{}{}",
        STANDARD.encode(&sealed.ciphertext),
        LEGACY_SEPARATOR,
        sealed.nonce.to_base64()
    ))
}

/// Inverse of [`encrypt_legacy_string`]
pub fn decrypt_legacy_string(key: &MetadataKey, data: &str) -> Result<Vec<u8>> {
    let (ciphertext, iv) = data.split_once(LEGACY_SEPARATOR).ok_or_else(|| {
        CryptoError::InvalidCiphertext("missing IV separator in legacy ciphertext".to_string())
    })?;
    let nonce = Nonce::from_base64(iv)?;
    let encoded = decrypt(key, &nonce, &STANDARD.decode(ciphertext)?)?;
    Ok(STANDARD.decode(encoded)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_gcm_roundtrip() {
        let key = MetadataKey::generate();
        let plaintext = b"Hello, World!";

        let sealed = encrypt(&key, plaintext).unwrap();
        assert_eq!(sealed.ciphertext.len(), plaintext.len() + TAG_SIZE);
        let decrypted = decrypt(&key, &sealed.nonce, &sealed.ciphertext).unwrap();

        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(&MetadataKey::generate(), b"secret").unwrap();
        let result = decrypt(&MetadataKey::generate(), &sealed.nonce, &sealed.ciphertext);
        assert!(matches!(result, Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn test_gzip_roundtrip() {
        let key = MetadataKey::generate();
        let plaintext = br#"{"files":{},"folders":{}}"#.repeat(20);

        let sealed = gzip_then_encrypt(&key, &plaintext).unwrap();
        assert!(sealed.ciphertext.len() < plaintext.len());
        let tag = sealed.tag().to_vec();
        let decrypted = decrypt_then_gunzip(&key, &sealed.nonce, &sealed.ciphertext, &tag).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_flipped_tag_byte_fails_closed() {
        let key = MetadataKey::generate();
        let sealed = gzip_then_encrypt(&key, b"top secret file list").unwrap();

        let mut tampered = sealed.ciphertext.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        let tag = tampered[tampered.len() - TAG_SIZE..].to_vec();
        let result = decrypt_then_gunzip(&key, &sealed.nonce, &tampered, &tag);
        assert!(matches!(result, Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn test_detached_tag_must_match() {
        let key = MetadataKey::generate();
        let sealed = gzip_then_encrypt(&key, b"payload").unwrap();

        let mut tag = sealed.tag().to_vec();
        tag[0] ^= 0xFF;
        let result = decrypt_then_gunzip(&key, &sealed.nonce, &sealed.ciphertext, &tag);
        assert!(matches!(result, Err(CryptoError::TagMismatch)));
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let key = MetadataKey::generate();
        let nonce = Nonce::generate();
        assert!(decrypt(&key, &nonce, &[0u8; 4]).is_err());
    }

    #[test]
    fn test_legacy_string_roundtrip() {
        let key = MetadataKey::generate();
        let json = br#"{"key":"abc","filename":"a.txt","mimetype":"text/plain"}"#;

        let framed = encrypt_legacy_string(&key, json).unwrap();
        let (_, iv) = framed.split_once('|').unwrap();
        assert_eq!(STANDARD.decode(iv).unwrap().len(), NONCE_SIZE);

        assert_eq!(decrypt_legacy_string(&key, &framed).unwrap(), json.to_vec());
    }

    #[test]
    fn test_legacy_string_without_separator_rejected() {
        let key = MetadataKey::generate();
        assert!(matches!(
            decrypt_legacy_string(&key, "bm90aGluZw=="),
            Err(CryptoError::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn test_nonce_length() {
        assert!(Nonce::from_bytes(&[0u8; 12]).is_err());
        let nonce = Nonce::generate();
        assert_eq!(Nonce::from_base64(&nonce.to_base64()).unwrap(), nonce);
    }
}
