//! X.509 certificates of folder users

use crate::{keys::PublicKey, CryptoError, Result};
use x509_parser::pem::parse_x509_pem;

/// A PEM certificate together with its extracted RSA public key
#[derive(Clone, Debug)]
pub struct Certificate {
    pem: String,
    public_key: PublicKey,
}

impl Certificate {
    /// Parse a PEM certificate. Fails when the certificate is malformed or
    /// does not carry an RSA public key.
    pub fn from_pem(pem: &str) -> Result<Self> {
        if pem.trim().is_empty() {
            return Err(CryptoError::InvalidCertificate("empty certificate".to_string()));
        }
        let (_, block) =
            parse_x509_pem(pem.as_bytes()).map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
        let certificate = block
            .parse_x509()
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
        let public_key = PublicKey::from_spki_der(certificate.public_key().raw)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;

        Ok(Self {
            pem: pem.to_string(),
            public_key,
        })
    }

    /// The certificate in PEM form, as stored in metadata documents
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// The certificate's public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_garbage() {
        assert!(matches!(Certificate::from_pem(""), Err(CryptoError::InvalidCertificate(_))));
        assert!(matches!(
            Certificate::from_pem("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n"),
            Err(CryptoError::InvalidCertificate(_))
        ));
    }
}
