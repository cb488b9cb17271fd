//! Account key material and settings

use crate::{version::MetadataVersion, MetadataError, Result};
use e2ee_crypto::{Certificate, PrivateKey, PublicKey};
use serde::{Deserialize, Serialize};

/// Account settings relevant to encrypted folders
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Server-side user id, the `userId` written into the users array
    pub user_id: String,
    /// Human readable name
    pub display_name: String,
    /// E2EE protocol version advertised by the server's capabilities
    pub e2ee_version: f64,
    /// Accept legacy metadata whose checksum does not match
    pub skip_checksum_validation: bool,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            display_name: String::new(),
            e2ee_version: 2.0,
            skip_checksum_validation: false,
        }
    }
}

impl AccountConfig {
    /// Create a new config for the given user
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            display_name: user_id.clone(),
            user_id,
            ..Default::default()
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Set the server's E2EE capability version
    pub fn with_e2ee_version(mut self, version: f64) -> Self {
        self.e2ee_version = version;
        self
    }

    /// Tolerate legacy checksum mismatches
    pub fn with_skip_checksum_validation(mut self, skip: bool) -> Self {
        self.skip_checksum_validation = skip;
        self
    }

    /// Load from a JSON object; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The local account: settings plus the key material used to unwrap
/// metadata keys. Shared read-only between jobs.
pub struct Account {
    config: AccountConfig,
    private_key: PrivateKey,
    certificate: Certificate,
    mnemonic: String,
}

impl Account {
    /// Assemble an account. The certificate must belong to the private key.
    pub fn new(
        config: AccountConfig,
        private_key: PrivateKey,
        certificate: Certificate,
        mnemonic: impl Into<String>,
    ) -> Result<Self> {
        if config.user_id.is_empty() {
            return Err(MetadataError::InvalidUser("account user id is empty".to_string()));
        }
        if private_key.public_key() != *certificate.public_key() {
            return Err(MetadataError::InvalidUser(
                "certificate does not match the private key".to_string(),
            ));
        }
        Ok(Self {
            config,
            private_key,
            certificate,
            mnemonic: mnemonic.into(),
        })
    }

    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.config.display_name
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn public_key(&self) -> &PublicKey {
        self.certificate.public_key()
    }

    /// Recovery mnemonic, used by the legacy checksum
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn e2ee_version(&self) -> f64 {
        self.config.e2ee_version
    }

    /// Version the writer targets for this account's server
    pub fn latest_supported_metadata_version(&self) -> MetadataVersion {
        MetadataVersion::latest_supported(self.config.e2ee_version)
    }

    pub fn should_skip_checksum_validation(&self) -> bool {
        self.config.skip_checksum_validation
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("config", &self.config)
            .field("public_key", self.public_key())
            .finish_non_exhaustive()
    }
}
