//! Metadata schema versions and encryption status

use serde_json::Value;
use std::fmt;

/// Schema version of a metadata document. Ordered from oldest to newest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum MetadataVersion {
    #[default]
    Undefined,
    V1,
    V1_2,
    V2_0,
}

impl MetadataVersion {
    /// Highest version a server advertising `capability` accepts.
    ///
    /// Thresholds: >= 2.0 is V2_0, >= 1.2 is V1_2, >= 1.0 is V1.
    pub fn latest_supported(capability: f64) -> Self {
        if capability >= 2.0 {
            Self::V2_0
        } else if capability >= 1.2 {
            Self::V1_2
        } else if capability >= 1.0 {
            Self::V1
        } else {
            Self::Undefined
        }
    }

    /// Interpret a `version` field, which servers send as a string or a number
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::from_version_str(s),
            Value::Number(n) => n.as_f64().map(Self::from_number).unwrap_or_default(),
            _ => Self::Undefined,
        }
    }

    fn from_version_str(s: &str) -> Self {
        match s.trim() {
            "1" | "1.0" => Self::V1,
            "1.2" => Self::V1_2,
            "2" | "2.0" => Self::V2_0,
            _ => Self::Undefined,
        }
    }

    fn from_number(n: f64) -> Self {
        const EPSILON: f64 = 1e-9;
        if (n - 2.0).abs() < EPSILON {
            Self::V2_0
        } else if (n - 1.2).abs() < EPSILON {
            Self::V1_2
        } else if (n - 1.0).abs() < EPSILON {
            Self::V1
        } else {
            Self::Undefined
        }
    }

    /// The string written into documents
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "",
            Self::V1 => "1.0",
            Self::V1_2 => "1.2",
            Self::V2_0 => "2.0",
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::V1 | Self::V1_2)
    }
}

impl fmt::Display for MetadataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Encryption status of a folder as recorded in the sync journal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum EncryptionStatus {
    #[default]
    NotEncrypted,
    Encrypted,
    EncryptedMigratedV1_2,
    EncryptedMigratedV2_0,
}

impl EncryptionStatus {
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Self::NotEncrypted)
    }
}

impl From<MetadataVersion> for EncryptionStatus {
    fn from(version: MetadataVersion) -> Self {
        match version {
            MetadataVersion::Undefined => Self::NotEncrypted,
            MetadataVersion::V1 => Self::Encrypted,
            MetadataVersion::V1_2 => Self::EncryptedMigratedV1_2,
            MetadataVersion::V2_0 => Self::EncryptedMigratedV2_0,
        }
    }
}

impl From<EncryptionStatus> for MetadataVersion {
    fn from(status: EncryptionStatus) -> Self {
        match status {
            EncryptionStatus::NotEncrypted => Self::Undefined,
            EncryptionStatus::Encrypted => Self::V1,
            EncryptionStatus::EncryptedMigratedV1_2 => Self::V1_2,
            EncryptionStatus::EncryptedMigratedV2_0 => Self::V2_0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(2.1, MetadataVersion::V2_0)]
    #[case(2.0, MetadataVersion::V2_0)]
    #[case(1.9, MetadataVersion::V1_2)]
    #[case(1.2, MetadataVersion::V1_2)]
    #[case(1.1, MetadataVersion::V1)]
    #[case(1.0, MetadataVersion::V1)]
    #[case(0.0, MetadataVersion::Undefined)]
    fn test_latest_supported(#[case] capability: f64, #[case] expected: MetadataVersion) {
        assert_eq!(MetadataVersion::latest_supported(capability), expected);
    }

    #[rstest]
    #[case(json!("1"), MetadataVersion::V1)]
    #[case(json!("1.0"), MetadataVersion::V1)]
    #[case(json!(1), MetadataVersion::V1)]
    #[case(json!(1.0), MetadataVersion::V1)]
    #[case(json!("1.2"), MetadataVersion::V1_2)]
    #[case(json!(1.2), MetadataVersion::V1_2)]
    #[case(json!("2"), MetadataVersion::V2_0)]
    #[case(json!("2.0"), MetadataVersion::V2_0)]
    #[case(json!(2), MetadataVersion::V2_0)]
    #[case(json!(2.0), MetadataVersion::V2_0)]
    #[case(json!("3.0"), MetadataVersion::Undefined)]
    #[case(json!(null), MetadataVersion::Undefined)]
    fn test_version_from_json(#[case] value: Value, #[case] expected: MetadataVersion) {
        assert_eq!(MetadataVersion::from_json(&value), expected);
    }

    #[test]
    fn test_version_ordering() {
        assert!(MetadataVersion::V2_0 > MetadataVersion::V1_2);
        assert!(MetadataVersion::V1_2 > MetadataVersion::V1);
        assert!(MetadataVersion::V1 > MetadataVersion::Undefined);
    }

    #[test]
    fn test_status_roundtrips_through_version() {
        for status in [
            EncryptionStatus::NotEncrypted,
            EncryptionStatus::Encrypted,
            EncryptionStatus::EncryptedMigratedV1_2,
            EncryptionStatus::EncryptedMigratedV2_0,
        ] {
            assert_eq!(EncryptionStatus::from(MetadataVersion::from(status)), status);
        }
    }
}
