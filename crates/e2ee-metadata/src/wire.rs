//! JSON shapes of metadata documents

use crate::{version::MetadataVersion, MetadataError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// `{ciphertext, nonce, authenticationTag}`, all base64
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CipherEnvelope {
    pub ciphertext: String,
    pub nonce: String,
    pub authentication_tag: String,
}

/// A v2.0 document
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DocumentV2 {
    pub metadata: CipherEnvelope,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<WireUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filedrop: Option<CipherEnvelope>,
    #[serde(default)]
    pub version: Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireUser {
    pub user_id: String,
    pub certificate: String,
    pub encrypted_metadata_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encrypted_filedrop_key: String,
}

/// Plaintext of the v2.0 `metadata` and `filedrop` ciphertexts
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CipherPayload {
    #[serde(default)]
    pub files: BTreeMap<String, WireFile>,
    #[serde(default)]
    pub folders: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_checksums: Vec<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub counter: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct WireFile {
    pub key: String,
    pub filename: String,
    pub mimetype: String,
    #[serde(alias = "nonce")]
    pub initialization_vector: String,
    pub authentication_tag: String,
}

/// A v1.0 or v1.2 document
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LegacyDocument {
    pub metadata: LegacyHeader,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, LegacyWireFile>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub filedrop: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LegacyHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata_keys: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LegacyWireFile {
    pub encrypted: String,
    #[serde(default)]
    pub initialization_vector: String,
    #[serde(default)]
    pub authentication_tag: String,
}

/// Plaintext of a legacy file's `encrypted` field
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct LegacyEncryptedPart {
    pub key: String,
    pub filename: String,
    pub mimetype: String,
}

/// Parse raw bytes, unwrapping an OCS response envelope
/// (`{"ocs":{"data":{"meta-data":"..."}}}`) when present
pub(crate) fn unwrap_document(bytes: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(bytes)?;
    match value.pointer("/ocs/data/meta-data") {
        Some(Value::String(inner)) => Ok(serde_json::from_str(inner)?),
        Some(_) => Err(MetadataError::InvalidDocument(
            "ocs meta-data is not a string".to_string(),
        )),
        None => Ok(value),
    }
}

/// `metadata.version`, falling back to the top-level `version`
pub(crate) fn document_version(document: &Value) -> MetadataVersion {
    document
        .pointer("/metadata/version")
        .or_else(|| document.get("version"))
        .map(MetadataVersion::from_json)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_ocs_envelope() {
        let inner = json!({"metadata": {"version": "1.2"}}).to_string();
        let wrapped = json!({"ocs": {"meta": {"status": "ok"}, "data": {"meta-data": inner}}});
        let document = unwrap_document(wrapped.to_string().as_bytes()).unwrap();
        assert_eq!(document_version(&document), MetadataVersion::V1_2);
    }

    #[test]
    fn test_bare_document_passthrough() {
        let bare = json!({"metadata": {"ciphertext": "x"}, "version": 2});
        let document = unwrap_document(bare.to_string().as_bytes()).unwrap();
        assert_eq!(document_version(&document), MetadataVersion::V2_0);
    }

    #[test]
    fn test_metadata_version_takes_precedence() {
        let document = json!({"metadata": {"version": 1}, "version": "2.0"});
        assert_eq!(document_version(&document), MetadataVersion::V1);
    }

    #[test]
    fn test_non_json_rejected() {
        assert!(unwrap_document(b"\x00garbage").is_err());
    }

    #[test]
    fn test_file_entry_accepts_nonce_alias() {
        let file: WireFile = serde_json::from_value(json!({
            "key": "a", "filename": "b", "mimetype": "c", "nonce": "d", "authenticationTag": "e"
        }))
        .unwrap();
        assert_eq!(file.initialization_vector, "d");
    }
}
