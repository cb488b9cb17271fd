//! Parsing and serialization of metadata documents.
//!
//! v2.0 bulk-encrypts the whole file list under the shared metadata key and
//! wraps that key per folder user. v1.x wraps the key for the account only
//! and encrypts each file entry on its own.

use crate::{
    file::EncryptedFile,
    folder::{FolderMetadata, FolderUser},
    version::MetadataVersion,
    wire::{
        CipherEnvelope, CipherPayload, DocumentV2, LegacyDocument, LegacyEncryptedPart, LegacyHeader,
        LegacyWireFile, WireFile, WireUser,
    },
    MetadataError, Result,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use e2ee_crypto::{
    legacy_metadata_checksum,
    symmetric::{self, decrypt_legacy_string, encrypt_legacy_string},
    MetadataKey, Nonce, PrivateKey,
};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument, warn};

impl FolderMetadata {
    pub(crate) fn setup_existing_metadata(&mut self, document: Value) -> Result<()> {
        let document: DocumentV2 = serde_json::from_value(document)?;

        let users_valid = self.is_root_encrypted_folder != document.users.is_empty();
        if !users_valid {
            return Err(MetadataError::InvalidUsers(if self.is_root_encrypted_folder {
                "top-level folder has no users".to_string()
            } else {
                "nested folder carries users".to_string()
            }));
        }

        self.file_drop = document.filedrop;
        for user in document.users {
            let folder_user = FolderUser {
                encrypted_metadata_key: STANDARD.decode(&user.encrypted_metadata_key)?,
                encrypted_filedrop_key: STANDARD.decode(&user.encrypted_filedrop_key)?,
                certificate_pem: user.certificate,
                user_id: user.user_id,
            };
            self.folder_users.insert(folder_user.user_id.clone(), folder_user);
        }

        if self.is_root_encrypted_folder {
            let user_id = self.account.user_id().to_string();
            let me = self
                .folder_users
                .get(&user_id)
                .ok_or_else(|| MetadataError::NotAFolderUser(user_id.clone()))?;
            let key = MetadataKey::from_bytes(&self.account.private_key().decrypt(&me.encrypted_metadata_key)?)?;
            if !me.encrypted_filedrop_key.is_empty() {
                match self.account.private_key().decrypt(&me.encrypted_filedrop_key) {
                    Ok(file_drop_key) => self.file_drop_key = Some(file_drop_key),
                    Err(e) => warn!(error = %e, "could not decrypt filedrop key"),
                }
            }
            self.key_for_decryption = Some(key.clone());
            self.key_for_encryption = Some(key);
        }

        let key = self
            .key_for_decryption
            .clone()
            .ok_or(MetadataError::MissingMetadataKey)?;
        let payload = open_envelope(&key, &document.metadata)?;

        if self.is_root_encrypted_folder && payload.key_checksums.is_empty() {
            return Err(MetadataError::InvalidDocument(
                "top-level folder has no key checksums".to_string(),
            ));
        }
        if !payload.key_checksums.is_empty() {
            self.key_checksums = payload.key_checksums.into_iter().collect();
        }
        if !self.verify_metadata_key(&key) {
            return Err(MetadataError::KeyVerification);
        }

        self.counter = payload.counter;
        self.files = entries_from_payload(payload.files, payload.folders)?;
        debug!(files = self.files.len(), users = self.folder_users.len(), "parsed 2.0 metadata");
        Ok(())
    }

    pub(crate) fn setup_existing_legacy_metadata(&mut self, document: Value) -> Result<()> {
        let document: LegacyDocument = serde_json::from_value(document)?;
        let header = &document.metadata;

        // Legacy folders carry their own key; only the encryption key handed
        // down from a 2.0 top-level folder survives.
        self.key_for_decryption = None;

        let wrapped_key = match header.metadata_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => key,
            None => header
                .metadata_keys
                .values()
                .next_back()
                .map(String::as_str)
                .ok_or(MetadataError::MissingMetadataKey)?,
        };
        let key = unwrap_legacy_metadata_key(self.account.private_key(), wrapped_key)?;

        for (encrypted_filename, file) in &document.files {
            let part = match decrypt_legacy_string(&key, &file.encrypted)
                .map_err(MetadataError::from)
                .and_then(|plain| Ok(serde_json::from_slice::<LegacyEncryptedPart>(&plain)?))
            {
                Ok(part) => part,
                Err(e) => {
                    warn!(%encrypted_filename, error = %e, "skipping undecryptable file entry");
                    continue;
                }
            };
            if part.filename.is_empty() {
                warn!(%encrypted_filename, "skipping file entry with an empty file name");
                continue;
            }

            let mut entry = EncryptedFile {
                encryption_key: STANDARD.decode(&part.key)?,
                mimetype: part.mimetype,
                initialization_vector: STANDARD.decode(&file.initialization_vector)?,
                authentication_tag: STANDARD.decode(&file.authentication_tag)?,
                encrypted_filename: encrypted_filename.clone(),
                original_filename: part.filename,
            };
            entry.normalize_mimetype();
            self.files.push(entry);
        }

        if self.existing_version >= MetadataVersion::V1_2 {
            let expected = header.checksum.clone().unwrap_or_default();
            let actual = self.legacy_checksum(header.metadata_key.as_deref().unwrap_or_default().as_bytes());
            if expected != actual {
                if !self.account.should_skip_checksum_validation() {
                    return Err(MetadataError::ChecksumMismatch { expected, actual });
                }
                warn!("legacy metadata checksum mismatch tolerated by account setting");
            }
        }

        self.legacy_file_drop = document.filedrop;
        self.key_for_decryption = Some(key.clone());
        if self.key_for_encryption.is_none() {
            self.key_for_encryption = Some(key);
        }
        debug!(files = self.files.len(), "parsed legacy metadata");
        Ok(())
    }

    fn legacy_checksum(&self, key_material: &[u8]) -> String {
        legacy_metadata_checksum(
            self.account.mnemonic(),
            self.files.iter().map(|file| file.encrypted_filename.as_str()),
            key_material,
        )
    }

    /// Serialize for upload at the highest version the server supports.
    ///
    /// Fails when the model is not valid, or when the server's version is
    /// below 2.0 but the folder was already migrated to 2.0.
    #[instrument(skip(self), fields(root = self.is_root_encrypted_folder))]
    pub fn encrypted_metadata(&mut self) -> Result<Vec<u8>> {
        if !self.is_valid {
            error!("refusing to serialize invalid metadata");
            return Err(MetadataError::NotValid);
        }

        let target = self.account.latest_supported_metadata_version();
        if self.existing_version == MetadataVersion::V2_0 && target < MetadataVersion::V2_0 {
            return Err(MetadataError::DowngradeRefused {
                existing: self.existing_version,
                target,
            });
        }

        match target {
            MetadataVersion::Undefined => Err(MetadataError::UnsupportedVersion(format!(
                "server capability {}",
                self.account.e2ee_version()
            ))),
            MetadataVersion::V2_0 => self.encrypted_metadata_v2(),
            legacy => self.encrypted_metadata_legacy(legacy),
        }
    }

    fn encrypted_metadata_v2(&mut self) -> Result<Vec<u8>> {
        let account = self.account.clone();
        if self.is_root_encrypted_folder
            && self.existing_version < MetadataVersion::V2_0
            && !self.folder_users.contains_key(account.user_id())
        {
            info!("migrating top-level folder to 2.0");
            self.add_user(account.user_id(), account.certificate().pem())?;
        }

        // A nested 2.0 document is only readable through the top-level key
        if !self.is_root_encrypted_folder && !self.key_from_top_level {
            error!("nested folder has no key from a 2.0 top-level folder, migrate the top-level folder first");
            return Err(MetadataError::MissingMetadataKey);
        }
        if self.is_root_encrypted_folder && self.folder_users.is_empty() {
            return Err(MetadataError::InvalidUsers("top-level folder has no users".to_string()));
        }
        if !self.is_root_encrypted_folder && !self.folder_users.is_empty() {
            return Err(MetadataError::InvalidUsers("nested folder carries users".to_string()));
        }

        let key_checksums: Vec<String> = if self.is_root_encrypted_folder {
            self.key_checksums.iter().cloned().collect()
        } else {
            Vec::new()
        };
        if self.is_root_encrypted_folder && key_checksums.is_empty() {
            return Err(MetadataError::InvalidDocument(
                "top-level folder has no key checksums".to_string(),
            ));
        }

        let key = self
            .key_for_encryption
            .clone()
            .ok_or(MetadataError::MissingMetadataKey)?;

        let mut payload = CipherPayload {
            key_checksums,
            counter: self.new_counter(),
            ..Default::default()
        };
        for file in &self.files {
            if file.is_directory() {
                payload
                    .folders
                    .insert(file.encrypted_filename.clone(), file.original_filename.clone());
            } else {
                payload.files.insert(
                    file.encrypted_filename.clone(),
                    WireFile {
                        key: STANDARD.encode(&file.encryption_key),
                        filename: file.original_filename.clone(),
                        mimetype: file.mimetype.clone(),
                        initialization_vector: STANDARD.encode(&file.initialization_vector),
                        authentication_tag: STANDARD.encode(&file.authentication_tag),
                    },
                );
            }
        }

        let sealed = symmetric::gzip_then_encrypt(&key, &serde_json::to_vec(&payload)?)?;
        let users = self
            .folder_users
            .values()
            .map(|user| WireUser {
                user_id: user.user_id.clone(),
                certificate: user.certificate_pem.clone(),
                encrypted_metadata_key: STANDARD.encode(&user.encrypted_metadata_key),
                encrypted_filedrop_key: STANDARD.encode(&user.encrypted_filedrop_key),
            })
            .collect();

        let document = DocumentV2 {
            metadata: CipherEnvelope {
                ciphertext: STANDARD.encode(&sealed.ciphertext),
                nonce: sealed.nonce.to_base64(),
                authentication_tag: STANDARD.encode(sealed.tag()),
            },
            users,
            filedrop: self.file_drop.clone(),
            version: Value::String(MetadataVersion::V2_0.as_str().to_string()),
        };

        self.encrypted_version = MetadataVersion::V2_0;
        Ok(serde_json::to_vec(&document)?)
    }

    fn encrypted_metadata_legacy(&mut self, target: MetadataVersion) -> Result<Vec<u8>> {
        let key = self
            .key_for_encryption
            .clone()
            .ok_or(MetadataError::MissingMetadataKey)?;

        // The key is base64 encoded twice before wrapping, as legacy readers expect.
        let double_encoded = STANDARD.encode(STANDARD.encode(key.as_bytes()));
        let encrypted_metadata_key = STANDARD.encode(self.account.public_key().encrypt(double_encoded.as_bytes())?);
        let checksum = self.legacy_checksum(encrypted_metadata_key.as_bytes());

        let mut files = BTreeMap::new();
        for file in &self.files {
            let part = LegacyEncryptedPart {
                key: STANDARD.encode(&file.encryption_key),
                filename: file.original_filename.clone(),
                mimetype: file.mimetype.clone(),
            };
            files.insert(
                file.encrypted_filename.clone(),
                LegacyWireFile {
                    encrypted: encrypt_legacy_string(&key, &serde_json::to_vec(&part)?)?,
                    initialization_vector: STANDARD.encode(&file.initialization_vector),
                    authentication_tag: STANDARD.encode(&file.authentication_tag),
                },
            );
        }

        let document = LegacyDocument {
            metadata: LegacyHeader {
                version: Some(Value::String(target.as_str().to_string())),
                metadata_key: Some(encrypted_metadata_key),
                metadata_keys: BTreeMap::new(),
                checksum: Some(checksum),
            },
            files,
            filedrop: self.legacy_file_drop.clone(),
        };

        self.encrypted_version = target;
        Ok(serde_json::to_vec(&document)?)
    }

    /// Move the entries uploaded through file drop into the regular file
    /// list and clear the file drop. Returns `false` when there was none.
    pub fn move_from_file_drop_to_files(&mut self) -> Result<bool> {
        let Some(envelope) = self.file_drop.as_ref() else {
            return Ok(false);
        };
        let key = self
            .key_for_decryption
            .clone()
            .ok_or(MetadataError::MissingMetadataKey)?;

        let payload = open_envelope(&key, envelope)?;
        let entries = entries_from_payload(payload.files, payload.folders)?;
        info!(entries = entries.len(), "moving file drop entries into the folder");
        for entry in entries {
            self.insert_file(entry);
        }
        self.file_drop = None;
        Ok(true)
    }
}

/// Decrypt and inflate a `{ciphertext, nonce, authenticationTag}` object
fn open_envelope(key: &MetadataKey, envelope: &CipherEnvelope) -> Result<CipherPayload> {
    let nonce = Nonce::from_base64(&envelope.nonce)?;
    let ciphertext = STANDARD.decode(&envelope.ciphertext)?;
    let tag = STANDARD.decode(&envelope.authentication_tag)?;
    let plaintext = symmetric::decrypt_then_gunzip(key, &nonce, &ciphertext, &tag)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

fn entries_from_payload(
    files: BTreeMap<String, WireFile>,
    folders: BTreeMap<String, String>,
) -> Result<Vec<EncryptedFile>> {
    let mut entries = Vec::with_capacity(files.len() + folders.len());
    for (encrypted_filename, file) in files {
        if file.filename.is_empty() {
            warn!(%encrypted_filename, "skipping file entry with an empty file name");
            continue;
        }
        let mut entry = EncryptedFile {
            encryption_key: STANDARD.decode(&file.key)?,
            mimetype: file.mimetype,
            initialization_vector: STANDARD.decode(&file.initialization_vector)?,
            authentication_tag: STANDARD.decode(&file.authentication_tag)?,
            encrypted_filename,
            original_filename: file.filename,
        };
        entry.normalize_mimetype();
        entries.push(entry);
    }
    for (encrypted_filename, original_filename) in folders {
        if original_filename.is_empty() {
            warn!(%encrypted_filename, "skipping folder entry with an empty name");
            continue;
        }
        entries.push(EncryptedFile::directory(encrypted_filename, original_filename));
    }
    Ok(entries)
}

/// RSA-decrypt a legacy `metadataKey` value and undo its double base64
fn unwrap_legacy_metadata_key(private_key: &PrivateKey, wrapped: &str) -> Result<MetadataKey> {
    let decrypted = private_key.decrypt(&STANDARD.decode(wrapped)?)?;
    let once = STANDARD.decode(decrypted)?;
    let twice = STANDARD.decode(once)?;
    Ok(MetadataKey::from_bytes(&twice)?)
}
