//! Media attachment records

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Document classification of an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Document => "document",
        }
    }

    pub fn from_db(value: &str) -> Result<Self, StoreError> {
        value
            .parse()
            .map_err(|_| StoreError::Unmarshal(format!("Unknown media kind '{}'", value)))
    }
}

impl FromStr for MediaKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(MediaKind::Photo),
            "document" => Ok(MediaKind::Document),
            other => Err(StoreError::InvalidInput(format!("Unknown media kind '{}'", other))),
        }
    }
}

/// Human moderation of one attachment, independent of its request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
        }
    }

    pub fn from_db(value: &str) -> Result<Self, StoreError> {
        match value {
            "pending" => Ok(ModerationStatus::Pending),
            "approved" => Ok(ModerationStatus::Approved),
            "rejected" => Ok(ModerationStatus::Rejected),
            other => Err(StoreError::Unmarshal(format!("Unknown moderation status '{}'", other))),
        }
    }
}

/// A blob uploaded with an edit request, before staging
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub kind: MediaKind,
    /// Free-text category, e.g. "storefront" or "permit"
    pub category: String,
}

impl MediaUpload {
    pub fn photo(filename: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.to_string(),
            content_type: Some(content_type.to_string()),
            bytes,
            kind: MediaKind::Photo,
            category: String::new(),
        }
    }
}

/// A stored photo or document tied to an edit request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub id: i64,
    pub request_id: i64,
    pub row_id: Option<i64>,
    pub bucket: String,
    pub locator: String,
    pub original_filename: String,
    pub content_type: Option<String>,
    pub byte_size: i64,
    pub kind: MediaKind,
    pub category: String,
    pub moderation_status: ModerationStatus,
    pub moderated_by: Option<String>,
    pub moderated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
