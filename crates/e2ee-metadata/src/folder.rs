//! In-memory model of one encrypted folder's metadata
//!
//! A [`FolderMetadata`] is built from the raw server document (or from
//! nothing, for a folder being encrypted for the first time), mutated by the
//! caller and serialized back with [`FolderMetadata::encrypted_metadata`].
//! Parsing and serializing live in `codec.rs`.

use crate::{
    account::Account,
    file::EncryptedFile,
    version::{EncryptionStatus, MetadataVersion},
    wire::{self, CipherEnvelope},
    MetadataError, Result,
};
use async_trait::async_trait;
use e2ee_crypto::{fingerprint_in_set, key_fingerprint, Certificate, MetadataKey};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Path used for the top-level encrypted folder itself
pub const ROOT_PATH: &str = "/";

/// Key material inherited from the top-level encrypted folder
#[derive(Clone, Debug, Default)]
pub struct RootEncryptedFolderInfo {
    /// `/` when the folder is itself the top-level folder, otherwise the
    /// top-level folder's remote path
    pub path: String,
    pub key_for_encryption: Option<MetadataKey>,
    pub key_for_decryption: Option<MetadataKey>,
    pub key_checksums: BTreeSet<String>,
}

impl RootEncryptedFolderInfo {
    /// Info for the top-level folder itself
    pub fn root() -> Self {
        Self::new(ROOT_PATH)
    }

    /// Info pointing at the top-level folder at `path`, without keys
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Info carrying already known keys, used for nested folders
    pub fn with_keys(
        path: impl Into<String>,
        key_for_encryption: MetadataKey,
        key_for_decryption: MetadataKey,
        key_checksums: BTreeSet<String>,
    ) -> Self {
        Self {
            path: path.into(),
            key_for_encryption: Some(key_for_encryption),
            key_for_decryption: Some(key_for_decryption),
            key_checksums,
        }
    }

    /// `/` when `current_path` is the top-level folder, else `top_level_path`
    pub fn create_root_path(current_path: &str, top_level_path: &str) -> String {
        if current_path.trim_matches('/') == top_level_path.trim_matches('/') {
            ROOT_PATH.to_string()
        } else {
            top_level_path.to_string()
        }
    }

    pub fn is_root(&self) -> bool {
        self.path == ROOT_PATH
    }

    pub fn keys_set(&self) -> bool {
        self.key_for_encryption.is_some() && self.key_for_decryption.is_some()
    }
}

/// A member of a top-level encrypted folder
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderUser {
    pub user_id: String,
    pub certificate_pem: String,
    /// Metadata key wrapped with the user's public key
    pub encrypted_metadata_key: Vec<u8>,
    pub encrypted_filedrop_key: Vec<u8>,
}

/// Where a nested folder gets its top-level folder's metadata from
#[async_trait]
pub trait RootMetadataSource: Send + Sync {
    /// Raw metadata of the top-level folder at `path`. `None` when it could
    /// not be fetched; implementors log the reason.
    async fn fetch_root_metadata(&self, path: &str) -> Option<Vec<u8>>;
}

/// Metadata of one encrypted folder
pub struct FolderMetadata {
    pub(crate) account: Arc<Account>,
    pub(crate) initial_metadata: Vec<u8>,
    pub(crate) is_root_encrypted_folder: bool,
    pub(crate) key_for_encryption: Option<MetadataKey>,
    pub(crate) key_for_decryption: Option<MetadataKey>,
    pub(crate) key_checksums: BTreeSet<String>,
    pub(crate) key_checksums_removed: BTreeSet<String>,
    /// Nested folder whose encryption key came from its top-level folder
    pub(crate) key_from_top_level: bool,
    pub(crate) file_drop: Option<CipherEnvelope>,
    pub(crate) legacy_file_drop: Map<String, Value>,
    pub(crate) file_drop_key: Option<Vec<u8>>,
    pub(crate) folder_users: BTreeMap<String, FolderUser>,
    pub(crate) files: Vec<EncryptedFile>,
    pub(crate) counter: u64,
    pub(crate) existing_version: MetadataVersion,
    pub(crate) encrypted_version: MetadataVersion,
    pub(crate) is_valid: bool,
}

impl FolderMetadata {
    fn unparsed(account: Arc<Account>, metadata: &[u8], root_info: RootEncryptedFolderInfo) -> Self {
        Self {
            account,
            initial_metadata: metadata.to_vec(),
            is_root_encrypted_folder: root_info.is_root(),
            key_from_top_level: !root_info.is_root() && root_info.key_for_encryption.is_some(),
            key_for_encryption: root_info.key_for_encryption,
            key_for_decryption: root_info.key_for_decryption,
            key_checksums: root_info.key_checksums,
            key_checksums_removed: BTreeSet::new(),
            file_drop: None,
            legacy_file_drop: Map::new(),
            file_drop_key: None,
            folder_users: BTreeMap::new(),
            files: Vec::new(),
            counter: 0,
            existing_version: MetadataVersion::Undefined,
            encrypted_version: MetadataVersion::Undefined,
            is_valid: false,
        }
    }

    /// Fresh metadata for a top-level folder being encrypted for the first time
    pub fn empty(account: Arc<Account>) -> Result<Self> {
        Self::from_bytes(account, &[], RootEncryptedFolderInfo::root())
    }

    /// Parse `metadata` with the key material in `root_info`. Never fetches
    /// anything: a nested folder without keys fails with
    /// [`MetadataError::MissingMetadataKey`]. Empty bytes create new metadata.
    pub fn from_bytes(account: Arc<Account>, metadata: &[u8], root_info: RootEncryptedFolderInfo) -> Result<Self> {
        let mut folder = Self::unparsed(account, metadata, root_info);
        folder.setup_metadata()?;
        Ok(folder)
    }

    /// Parse `metadata`, first fetching the top-level folder's metadata
    /// through `source` when this is a nested folder and `root_info` carries
    /// no keys.
    #[instrument(skip_all, fields(root = %root_info.path))]
    pub async fn load<S>(
        account: Arc<Account>,
        metadata: &[u8],
        mut root_info: RootEncryptedFolderInfo,
        source: &S,
    ) -> Result<Self>
    where
        S: RootMetadataSource + ?Sized,
    {
        if !root_info.is_root() && !root_info.keys_set() {
            debug!("nested folder without keys, fetching top-level metadata");
            match source.fetch_root_metadata(&root_info.path).await {
                Some(bytes) => {
                    match Self::from_bytes(account.clone(), &bytes, RootEncryptedFolderInfo::root()) {
                        Ok(root) if root.is_version_2_and_up() => {
                            root_info.key_for_encryption = root.key_for_encryption.clone();
                            root_info.key_for_decryption = root.key_for_decryption.clone();
                            root_info.key_checksums = root.key_checksums.clone();
                        }
                        Ok(_) => debug!("top-level metadata is legacy, it has no shared key"),
                        Err(e) => warn!(error = %e, "could not parse top-level metadata"),
                    }
                }
                None => warn!("top-level metadata unavailable"),
            }
        }
        Self::from_bytes(account, metadata, root_info)
    }

    fn setup_metadata(&mut self) -> Result<()> {
        if self.initial_metadata.is_empty() {
            self.setup_empty_metadata()?;
        } else {
            let document = wire::unwrap_document(&self.initial_metadata)?;
            self.existing_version = wire::document_version(&document);
            debug!(version = %self.existing_version, "setting up existing metadata");
            match self.existing_version {
                MetadataVersion::Undefined => {
                    return Err(MetadataError::UnsupportedVersion(
                        "document has no recognizable version".to_string(),
                    ))
                }
                MetadataVersion::V1 | MetadataVersion::V1_2 => self.setup_existing_legacy_metadata(document)?,
                MetadataVersion::V2_0 => self.setup_existing_metadata(document)?,
            }
        }

        if self.key_for_encryption.is_none() || self.key_for_decryption.is_none() {
            return Err(MetadataError::MissingMetadataKey);
        }
        self.is_valid = true;
        Ok(())
    }

    fn setup_empty_metadata(&mut self) -> Result<()> {
        debug!(root = self.is_root_encrypted_folder, "setting up empty metadata");
        if self.account.latest_supported_metadata_version() < MetadataVersion::V2_0 {
            let key = MetadataKey::generate();
            self.key_for_decryption = Some(key.clone());
            self.key_for_encryption = Some(key);
            return Ok(());
        }

        if self.is_root_encrypted_folder {
            let account = self.account.clone();
            self.add_user(account.user_id(), account.certificate().pem())?;
            self.key_for_decryption = self.key_for_encryption.clone();
        }
        Ok(())
    }

    /// Grant `user_id` access. Rotates the metadata key and re-wraps it for
    /// every member.
    #[instrument(skip(self, certificate_pem))]
    pub fn add_user(&mut self, user_id: &str, certificate_pem: &str) -> Result<()> {
        if !self.is_root_encrypted_folder {
            return Err(MetadataError::NotRootFolder("adding a folder user"));
        }
        if user_id.is_empty() {
            return Err(MetadataError::InvalidUser("empty user id".to_string()));
        }
        let certificate = Certificate::from_pem(certificate_pem)
            .map_err(|e| MetadataError::InvalidUser(format!("certificate of {user_id}: {e}")))?;

        self.create_new_metadata_key_for_encryption();
        let key = self
            .key_for_encryption
            .as_ref()
            .ok_or(MetadataError::MissingMetadataKey)?;
        let encrypted_metadata_key = certificate.public_key().encrypt(key.as_bytes())?;

        self.folder_users.insert(
            user_id.to_string(),
            FolderUser {
                user_id: user_id.to_string(),
                certificate_pem: certificate.pem().to_string(),
                encrypted_metadata_key,
                encrypted_filedrop_key: Vec::new(),
            },
        );
        self.update_users_encrypted_metadata_key();
        info!(users = self.folder_users.len(), "folder user added");
        Ok(())
    }

    /// Revoke `user_id`'s access. Rotates the metadata key so the removed
    /// user's copy becomes useless.
    #[instrument(skip(self))]
    pub fn remove_user(&mut self, user_id: &str) -> Result<()> {
        if !self.is_root_encrypted_folder {
            return Err(MetadataError::NotRootFolder("removing a folder user"));
        }
        if user_id.is_empty() {
            return Err(MetadataError::InvalidUser("empty user id".to_string()));
        }

        self.create_new_metadata_key_for_encryption();
        if self.folder_users.remove(user_id).is_none() {
            debug!("user was not a member");
        }
        self.update_users_encrypted_metadata_key();
        info!(users = self.folder_users.len(), "folder user removed");
        Ok(())
    }

    /// Rotate the metadata key without changing membership
    #[instrument(skip(self))]
    pub fn rotate_metadata_key(&mut self) -> Result<()> {
        if !self.is_root_encrypted_folder {
            return Err(MetadataError::NotRootFolder("rotating the metadata key"));
        }
        self.create_new_metadata_key_for_encryption();
        self.update_users_encrypted_metadata_key();
        Ok(())
    }

    /// Replace the encryption key with a fresh one. The old key's checksum
    /// moves to [`key_checksums_removed`](Self::key_checksums_removed). No-op
    /// on nested folders.
    pub fn create_new_metadata_key_for_encryption(&mut self) {
        if !self.is_root_encrypted_folder {
            return;
        }
        if let Some(old) = self.key_for_encryption.take() {
            let old_checksum = key_fingerprint(&old);
            self.key_checksums.remove(&old_checksum);
            self.key_checksums_removed.insert(old_checksum);
        }
        let key = MetadataKey::generate();
        self.key_checksums.insert(key_fingerprint(&key));
        self.key_for_encryption = Some(key);
    }

    fn update_users_encrypted_metadata_key(&mut self) {
        let Some(key) = self.key_for_encryption.clone() else {
            return;
        };
        let file_drop_key = self.file_drop_key.clone();

        for user in self.folder_users.values_mut() {
            let certificate = match Certificate::from_pem(&user.certificate_pem) {
                Ok(certificate) => certificate,
                Err(e) => {
                    warn!(user_id = %user.user_id, error = %e, "skipping user with unusable certificate");
                    continue;
                }
            };
            match certificate.public_key().encrypt(key.as_bytes()) {
                Ok(wrapped) => user.encrypted_metadata_key = wrapped,
                Err(e) => {
                    warn!(user_id = %user.user_id, error = %e, "could not wrap metadata key");
                    continue;
                }
            }
            if let Some(file_drop_key) = &file_drop_key {
                match certificate.public_key().encrypt(file_drop_key) {
                    Ok(wrapped) => user.encrypted_filedrop_key = wrapped,
                    Err(e) => warn!(user_id = %user.user_id, error = %e, "could not wrap filedrop key"),
                }
            }
        }
    }

    /// Add or replace a file entry. An existing entry with the same original
    /// or encrypted name is dropped first.
    pub fn add_encrypted_file(&mut self, file: EncryptedFile) -> Result<()> {
        if !self.is_valid {
            return Err(MetadataError::NotValid);
        }
        if file.original_filename.is_empty() || file.encrypted_filename.is_empty() {
            return Err(MetadataError::InvalidFile(
                "original and encrypted file names must not be empty".to_string(),
            ));
        }
        self.insert_file(file);
        Ok(())
    }

    pub(crate) fn insert_file(&mut self, file: EncryptedFile) {
        self.files.retain(|existing| {
            existing.original_filename != file.original_filename
                && existing.encrypted_filename != file.encrypted_filename
        });
        self.files.push(file);
    }

    /// Remove the entry named `original_filename`. Returns whether one existed.
    pub fn remove_encrypted_file(&mut self, original_filename: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|file| file.original_filename != original_filename);
        self.files.len() != before
    }

    pub fn remove_all_encrypted_files(&mut self) {
        self.files.clear();
    }

    /// Whether `key` is one of the folder tree's known keys. Only v2.0
    /// metadata carries checksums. A top-level document without checksums is
    /// rejected while parsing, so an empty set here means a nested folder
    /// whose caller supplied no checksums.
    pub fn verify_metadata_key(&self, key: &MetadataKey) -> bool {
        if self.existing_version < MetadataVersion::V2_0 || self.key_checksums.is_empty() {
            return true;
        }
        fingerprint_in_set(&key_fingerprint(key), &self.key_checksums)
    }

    pub fn files(&self) -> &[EncryptedFile] {
        &self.files
    }

    /// Entry by original name
    pub fn file(&self, original_filename: &str) -> Option<&EncryptedFile> {
        self.files.iter().find(|file| file.original_filename == original_filename)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn is_root_encrypted_folder(&self) -> bool {
        self.is_root_encrypted_folder
    }

    pub fn is_file_drop_present(&self) -> bool {
        self.file_drop.is_some() || !self.legacy_file_drop.is_empty()
    }

    /// The server supports a newer version than the one stored
    pub fn encrypted_metadata_need_update(&self) -> bool {
        self.account.latest_supported_metadata_version() > self.existing_version
    }

    pub fn is_version_2_and_up(&self) -> bool {
        self.existing_version >= MetadataVersion::V2_0
    }

    pub fn metadata_key_for_encryption(&self) -> Option<&MetadataKey> {
        self.key_for_encryption.as_ref()
    }

    pub fn metadata_key_for_decryption(&self) -> Option<&MetadataKey> {
        self.key_for_decryption.as_ref()
    }

    pub fn key_checksums(&self) -> &BTreeSet<String> {
        &self.key_checksums
    }

    /// Checksums of keys rotated away during this session
    pub fn key_checksums_removed(&self) -> &BTreeSet<String> {
        &self.key_checksums_removed
    }

    /// Current and rotated-away checksums, what nested folders need to
    /// verify either key
    pub fn all_key_checksums(&self) -> BTreeSet<String> {
        self.key_checksums
            .union(&self.key_checksums_removed)
            .cloned()
            .collect()
    }

    /// Ids of the folder's members, sorted
    pub fn folder_user_ids(&self) -> Vec<&str> {
        self.folder_users.keys().map(String::as_str).collect()
    }

    pub fn folder_user(&self, user_id: &str) -> Option<&FolderUser> {
        self.folder_users.get(user_id)
    }

    pub fn existing_metadata_version(&self) -> MetadataVersion {
        self.existing_version
    }

    /// Version of the last [`encrypted_metadata`](Self::encrypted_metadata) output
    pub fn encrypted_metadata_version(&self) -> MetadataVersion {
        self.encrypted_version
    }

    pub fn existing_metadata_encryption_status(&self) -> EncryptionStatus {
        self.existing_version.into()
    }

    pub fn encrypted_metadata_encryption_status(&self) -> EncryptionStatus {
        self.encrypted_version.into()
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Counter to send with the next lock and to store on the next write
    pub fn new_counter(&self) -> u64 {
        self.counter + 1
    }

    /// The bytes this model was parsed from
    pub fn initial_metadata(&self) -> &[u8] {
        &self.initial_metadata
    }

    pub fn account(&self) -> &Arc<Account> {
        &self.account
    }
}

impl std::fmt::Debug for FolderMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderMetadata")
            .field("root", &self.is_root_encrypted_folder)
            .field("existing_version", &self.existing_version)
            .field("files", &self.files.len())
            .field("users", &self.folder_users.len())
            .field("valid", &self.is_valid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::AccountConfig;

    fn text_file(name: &str) -> EncryptedFile {
        EncryptedFile {
            encryption_key: vec![1u8; 16],
            mimetype: "text/plain".to_string(),
            initialization_vector: vec![2u8; 16],
            authentication_tag: vec![3u8; 16],
            encrypted_filename: format!("enc-{name}"),
            original_filename: name.to_string(),
        }
    }

    #[test]
    fn test_create_root_path() {
        assert_eq!(RootEncryptedFolderInfo::create_root_path("/E2EE", "/E2EE/"), "/");
        assert_eq!(RootEncryptedFolderInfo::create_root_path("/E2EE/sub", "/E2EE"), "/E2EE");
    }

    #[test]
    fn test_empty_root_adds_current_user() {
        let metadata = FolderMetadata::empty(testing::account("alice")).unwrap();

        assert!(metadata.is_valid());
        assert!(metadata.is_root_encrypted_folder());
        assert_eq!(metadata.folder_user_ids(), vec!["alice"]);
        assert_eq!(metadata.key_checksums().len(), 1);
        assert_eq!(
            metadata.metadata_key_for_encryption(),
            metadata.metadata_key_for_decryption()
        );
    }

    #[test]
    fn test_empty_legacy_generates_key_without_users() {
        let account = testing::account_with("alice", AccountConfig::new("alice").with_e2ee_version(1.2));
        let metadata = FolderMetadata::empty(account).unwrap();

        assert!(metadata.is_valid());
        assert!(metadata.folder_user_ids().is_empty());
        assert!(metadata.metadata_key_for_encryption().is_some());
    }

    #[test]
    fn test_nested_without_keys_is_invalid() {
        let result = FolderMetadata::from_bytes(
            testing::account("alice"),
            &[],
            RootEncryptedFolderInfo::new("/E2EE"),
        );
        assert!(matches!(result, Err(MetadataError::MissingMetadataKey)));
    }

    #[test]
    fn test_add_user_rotates_key() {
        let mut metadata = FolderMetadata::empty(testing::account("alice")).unwrap();
        let old_key = metadata.metadata_key_for_encryption().cloned().unwrap();
        let old_checksum = key_fingerprint(&old_key);

        let bob = testing::identity("bob");
        metadata.add_user("bob", bob.certificate.pem()).unwrap();

        let new_key = metadata.metadata_key_for_encryption().cloned().unwrap();
        assert_ne!(new_key, old_key);
        assert!(metadata.key_checksums().contains(&key_fingerprint(&new_key)));
        assert!(!metadata.key_checksums().contains(&old_checksum));
        assert!(metadata.key_checksums_removed().contains(&old_checksum));
        assert!(!fingerprint_in_set(&old_checksum, metadata.key_checksums()));

        for user_id in ["alice", "bob"] {
            let identity = testing::identity(user_id);
            let wrapped = &metadata.folder_user(user_id).unwrap().encrypted_metadata_key;
            assert_eq!(identity.private_key.decrypt(wrapped).unwrap(), new_key.as_bytes());
        }
    }

    #[test]
    fn test_remove_user_rotates_and_drops_member() {
        let mut metadata = FolderMetadata::empty(testing::account("alice")).unwrap();
        metadata.add_user("bob", testing::identity("bob").certificate.pem()).unwrap();
        let key_with_bob = metadata.metadata_key_for_encryption().cloned().unwrap();

        metadata.remove_user("bob").unwrap();

        assert_eq!(metadata.folder_user_ids(), vec!["alice"]);
        assert_ne!(metadata.metadata_key_for_encryption().unwrap(), &key_with_bob);
        assert!(!metadata.key_checksums().contains(&key_fingerprint(&key_with_bob)));
    }

    #[test]
    fn test_rotate_keeps_members() {
        let mut metadata = FolderMetadata::empty(testing::account("alice")).unwrap();
        metadata.add_user("bob", testing::identity("bob").certificate.pem()).unwrap();
        let before = metadata.metadata_key_for_encryption().cloned().unwrap();

        metadata.rotate_metadata_key().unwrap();

        let after = metadata.metadata_key_for_encryption().cloned().unwrap();
        assert_ne!(after, before);
        assert_eq!(metadata.folder_user_ids(), vec!["alice", "bob"]);
        assert_eq!(metadata.all_key_checksums().len(), 3);
        let bob = &metadata.folder_user("bob").unwrap().encrypted_metadata_key;
        assert_eq!(testing::identity("bob").private_key.decrypt(bob).unwrap(), after.as_bytes());
    }

    #[test]
    fn test_add_user_rejects_bad_input() {
        let mut metadata = FolderMetadata::empty(testing::account("alice")).unwrap();
        let before = metadata.metadata_key_for_encryption().cloned();

        assert!(matches!(
            metadata.add_user("bob", "not a certificate"),
            Err(MetadataError::InvalidUser(_))
        ));
        assert!(matches!(
            metadata.add_user("", testing::identity("bob").certificate.pem()),
            Err(MetadataError::InvalidUser(_))
        ));
        assert_eq!(metadata.metadata_key_for_encryption().cloned(), before);
    }

    #[test]
    fn test_membership_requires_root() {
        let key = MetadataKey::generate();
        let info = RootEncryptedFolderInfo::with_keys("/E2EE", key.clone(), key, BTreeSet::new());
        let mut nested = FolderMetadata::from_bytes(testing::account("alice"), &[], info).unwrap();

        assert!(matches!(
            nested.add_user("bob", testing::identity("bob").certificate.pem()),
            Err(MetadataError::NotRootFolder(_))
        ));
        assert!(matches!(nested.remove_user("bob"), Err(MetadataError::NotRootFolder(_))));
        assert!(matches!(nested.rotate_metadata_key(), Err(MetadataError::NotRootFolder(_))));

        let before = nested.metadata_key_for_encryption().cloned();
        nested.create_new_metadata_key_for_encryption();
        assert_eq!(nested.metadata_key_for_encryption().cloned(), before);
    }

    #[test]
    fn test_unusable_certificate_is_skipped_on_rewrap() {
        let mut metadata = FolderMetadata::empty(testing::account("alice")).unwrap();
        metadata.add_user("bob", testing::identity("bob").certificate.pem()).unwrap();
        metadata
            .folder_users
            .get_mut("bob")
            .unwrap()
            .certificate_pem = "garbage".to_string();

        metadata
            .add_user("carol", testing::identity("carol").certificate.pem())
            .unwrap();

        let key = metadata.metadata_key_for_encryption().cloned().unwrap();
        let carol = &metadata.folder_user("carol").unwrap().encrypted_metadata_key;
        assert_eq!(testing::identity("carol").private_key.decrypt(carol).unwrap(), key.as_bytes());
        assert_eq!(metadata.folder_user_ids(), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_add_file_replaces_same_name() {
        let mut metadata = FolderMetadata::empty(testing::account("alice")).unwrap();
        metadata.add_encrypted_file(text_file("a.txt")).unwrap();

        let mut replacement = text_file("a.txt");
        replacement.encrypted_filename = "enc-other".to_string();
        metadata.add_encrypted_file(replacement).unwrap();

        assert_eq!(metadata.files().len(), 1);
        assert_eq!(metadata.file("a.txt").unwrap().encrypted_filename, "enc-other");
    }

    #[test]
    fn test_add_file_rejects_empty_name() {
        let mut metadata = FolderMetadata::empty(testing::account("alice")).unwrap();
        let result = metadata.add_encrypted_file(text_file(""));
        assert!(matches!(result, Err(MetadataError::InvalidFile(_))));
    }

    #[test]
    fn test_remove_files() {
        let mut metadata = FolderMetadata::empty(testing::account("alice")).unwrap();
        metadata.add_encrypted_file(text_file("a.txt")).unwrap();
        metadata.add_encrypted_file(text_file("b.txt")).unwrap();

        assert!(metadata.remove_encrypted_file("a.txt"));
        assert!(!metadata.remove_encrypted_file("a.txt"));
        assert_eq!(metadata.files().len(), 1);

        metadata.remove_all_encrypted_files();
        assert!(metadata.files().is_empty());
    }

    #[test]
    fn test_counter() {
        let metadata = FolderMetadata::empty(testing::account("alice")).unwrap();
        assert_eq!(metadata.counter(), 0);
        assert_eq!(metadata.new_counter(), 1);
    }
}
