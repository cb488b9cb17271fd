//! Key fingerprints and legacy metadata checksums (SHA-256, hex)

use crate::keys::MetadataKey;
use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Fingerprint of a metadata key as stored in `keyChecksums`
pub fn key_fingerprint(key: &MetadataKey) -> String {
    sha256_hex(key.as_bytes())
}

/// Constant-time membership test of a fingerprint in a checksum set.
///
/// Every entry is compared so the running time does not reveal which one
/// matched.
pub fn fingerprint_in_set<'a, I>(fingerprint: &str, set: I) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    let candidate = fingerprint.as_bytes();
    let mut found = Choice::from(0u8);
    for entry in set {
        let entry = entry.as_bytes();
        if entry.len() == candidate.len() {
            found |= entry.ct_eq(candidate);
        }
    }
    found.into()
}

/// Checksum embedded in legacy (v1.x) metadata.
///
/// SHA-256 over the recovery mnemonic without spaces, each encrypted
/// filename in sorted order, then `key_material`.
pub fn legacy_metadata_checksum<'a, I>(mnemonic: &str, encrypted_filenames: I, key_material: &[u8]) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names: Vec<&str> = encrypted_filenames.into_iter().collect();
    names.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(mnemonic.replace(' ', "").as_bytes());
    for name in names {
        hasher.update(name.as_bytes());
    }
    hasher.update(key_material);
    hex::encode(hasher.finalize())
}
