//! Dataset, version snapshot and row records

use crate::error::StoreError;
use crate::models::RowFields;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who may read a dataset without an explicit grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "private" => Ok(Visibility::Private),
            "public" => Ok(Visibility::Public),
            other => Err(StoreError::InvalidInput(format!("Unknown visibility '{}'", other))),
        }
    }
}

/// A named tabular resource; the `current_*` fields point at its latest version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,
    pub name: String,
    pub current_version: i64,
    pub row_count: i64,
    pub byte_size: i64,
    pub visibility: Visibility,
    pub column_order: Vec<String>,
    pub deleted: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot written once per ingest, replace or revert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetVersion {
    pub dataset_id: i64,
    pub version: i64,
    pub row_count: i64,
    pub byte_size: i64,
    pub visibility: Visibility,
    pub column_order: Vec<String>,
    /// SHA-256 of the uploaded file; `None` for reverts
    pub content_sha256: Option<String>,
    /// Version this snapshot was cloned from, for reverts
    pub reverted_from: Option<i64>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// One record within a specific dataset version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRow {
    pub id: i64,
    pub dataset_id: i64,
    pub version: i64,
    pub fields: RowFields,
}

/// Facts about the uploaded file a version was built from
#[derive(Debug, Clone, Default)]
pub struct SourceInfo {
    pub byte_size: i64,
    pub content_sha256: Option<String>,
}

impl SourceInfo {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        Self {
            byte_size: bytes.len() as i64,
            content_sha256: Some(format!("{:x}", Sha256::digest(bytes))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_parse_is_case_insensitive() {
        assert_eq!("PUBLIC".parse::<Visibility>().unwrap(), Visibility::Public);
        assert_eq!("private".parse::<Visibility>().unwrap(), Visibility::Private);
        assert!("hidden".parse::<Visibility>().is_err());
    }

    #[test]
    fn test_source_info_hashes_bytes() {
        let info = SourceInfo::from_bytes(b"abc");
        assert_eq!(info.byte_size, 3);
        assert_eq!(
            info.content_sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }
}
