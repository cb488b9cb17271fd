//! Generated accounts for tests.
//!
//! RSA key generation is slow, so identities are created once per process
//! and cached by user id.

use crate::{Account, AccountConfig};
use e2ee_crypto::{Certificate, PrivateKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Recovery phrase shared by all generated accounts
pub const TEST_MNEMONIC: &str = "quarter plastic orbit glimpse fence rural cabin motor gospel wagon lunar trophy";

/// Key pair and self-signed certificate of a test user
#[derive(Clone)]
pub struct TestIdentity {
    pub user_id: String,
    pub private_key: PrivateKey,
    pub certificate: Certificate,
}

/// The cached identity for `user_id`, generated on first use
pub fn identity(user_id: &str) -> TestIdentity {
    static CACHE: OnceLock<Mutex<HashMap<String, TestIdentity>>> = OnceLock::new();
    let cache = CACHE.get_or_init(Default::default);

    if let Some(found) = cache.lock().get(user_id) {
        return found.clone();
    }
    let generated = generate(user_id);
    cache
        .lock()
        .entry(user_id.to_string())
        .or_insert(generated)
        .clone()
}

fn generate(user_id: &str) -> TestIdentity {
    let private_key = PrivateKey::generate(2048).expect("rsa key generation");
    let pem = private_key.to_pem().expect("pkcs8 encoding");

    let key_pair = rcgen::KeyPair::from_pem_and_sign_algo(&pem, &rcgen::PKCS_RSA_SHA256)
        .expect("rcgen key pair");
    let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).expect("certificate params");
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, user_id);
    let certificate = params.self_signed(&key_pair).expect("self-signed certificate");

    TestIdentity {
        user_id: user_id.to_string(),
        private_key,
        certificate: Certificate::from_pem(&certificate.pem()).expect("parse generated certificate"),
    }
}

/// An account for `user_id` on a v2.0 server
pub fn account(user_id: &str) -> Arc<Account> {
    account_with(user_id, AccountConfig::new(user_id))
}

/// An account for `user_id` with custom settings
pub fn account_with(user_id: &str, config: AccountConfig) -> Arc<Account> {
    let identity = identity(user_id);
    Arc::new(
        Account::new(config, identity.private_key, identity.certificate, TEST_MNEMONIC)
            .expect("test account"),
    )
}
