//! RSA-OAEP (SHA-256) wrapping of small secrets
//!
//! Only metadata keys and filedrop keys go through here, never bulk data.

use crate::{
    keys::{PrivateKey, PublicKey},
    CryptoError, Result,
};
use rand::rngs::OsRng;
use rsa::Oaep;
use sha2::Sha256;

impl PublicKey {
    /// Encrypt `data` so only the holder of the matching private key can read it
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.as_rsa()
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), data)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }
}

impl PrivateKey {
    /// Decrypt data produced by [`PublicKey::encrypt`]
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.as_rsa()
            .decrypt(Oaep::new::<Sha256>(), data)
            .map_err(|e| CryptoError::Decryption(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oaep_roundtrip() {
        let private_key = PrivateKey::generate(1024).unwrap();
        let secret = [0x42u8; 16];

        let wrapped = private_key.public_key().encrypt(&secret).unwrap();
        assert_eq!(wrapped.len(), 128);
        assert_eq!(private_key.decrypt(&wrapped).unwrap(), secret);
    }

    #[test]
    fn test_oaep_wrong_key_fails() {
        let alice = PrivateKey::generate(1024).unwrap();
        let mallory = PrivateKey::generate(1024).unwrap();

        let wrapped = alice.public_key().encrypt(b"metadata key").unwrap();
        assert!(mallory.decrypt(&wrapped).is_err());
    }
}
