//! Edit request, detail and submission records

use crate::error::StoreError;
use crate::models::MediaAttachment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Review status of an edit request
///
/// `Submitting` is internal: a request holds it only while its media is
/// being staged and it is never returned by listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Submitting,
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Submitting => "submitting",
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    /// Decode a stored status column
    pub fn from_db(value: &str) -> Result<Self, StoreError> {
        match value {
            "submitting" => Ok(RequestStatus::Submitting),
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(StoreError::Unmarshal(format!("Unknown request status '{}'", other))),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses user-supplied status filters; `submitting` is not selectable
impl FromStr for RequestStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(StoreError::InvalidInput(format!("Unknown request status '{}'", other))),
        }
    }
}

/// Row-identity binding of a new-row request
///
/// `pending + Unbound` → (bind) → `pending + Bound` → (finish) → `approved`.
/// A failed or cancelled approval unbinds back to `pending + Unbound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingState {
    Unbound,
    Bound,
}

impl BindingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingState::Unbound => "unbound",
            BindingState::Bound => "bound",
        }
    }

    pub fn from_db(value: &str) -> Result<Self, StoreError> {
        match value {
            "unbound" => Ok(BindingState::Unbound),
            "bound" => Ok(BindingState::Bound),
            other => Err(StoreError::Unmarshal(format!("Unknown binding state '{}'", other))),
        }
    }
}

/// Who submitted a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
}

impl Submitter {
    pub fn new(user_id: &str, first_name: &str, last_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Consent given by the submitter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentFlags {
    /// Submitted media and values may be published
    pub publish: bool,
    /// Submitter may be contacted about the request
    pub contact: bool,
}

/// One reviewable unit of work against one logical row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRequest {
    pub id: i64,
    pub dataset_id: i64,
    /// Unset for new-row requests until approval binds a row
    pub row_id: Option<i64>,
    pub submitter: Submitter,
    pub status: RequestStatus,
    /// The target row already exists (in-place edit)
    pub existing_row: bool,
    pub consent: ConsentFlags,
    pub community_tags: Vec<String>,
    pub binding_state: BindingState,
    /// Staging prefix being relocated while `Bound`
    pub relocation_prefix: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One field-level change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRequestDetail {
    pub id: i64,
    pub request_id: i64,
    pub dataset_id: i64,
    pub row_id: Option<i64>,
    pub field_name: String,
    pub old_value: String,
    pub new_value: String,
    pub created_at: DateTime<Utc>,
}

impl EditRequestDetail {
    /// Both values empty: carries no change and is left out of change reports
    pub fn is_void(&self) -> bool {
        self.old_value.is_empty() && self.new_value.is_empty()
    }
}

/// A proposed field change as submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field_name: String,
    #[serde(default)]
    pub old_value: String,
    #[serde(default)]
    pub new_value: String,
}

impl FieldChange {
    pub fn new(field_name: &str, old_value: &str, new_value: &str) -> Self {
        Self {
            field_name: field_name.to_string(),
            old_value: old_value.to_string(),
            new_value: new_value.to_string(),
        }
    }
}

/// Reviewer's last-mile replacement for a detail's `new_value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailOverride {
    pub detail_id: i64,
    pub new_value: String,
}

/// Request metadata supplied at submission
#[derive(Debug, Clone, Default)]
pub struct SubmissionMeta {
    pub consent: ConsentFlags,
    pub community_tags: Vec<String>,
}

/// A request together with its details and attachments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRequestRecord {
    pub request: EditRequest,
    pub details: Vec<EditRequestDetail>,
    pub attachments: Vec<MediaAttachment>,
}

impl EditRequestRecord {
    /// Number of details that carry a change
    pub fn change_count(&self) -> usize {
        self.details.iter().filter(|d| !d.is_void()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_status_parse() {
        assert_eq!(" Approved ".parse::<RequestStatus>().unwrap(), RequestStatus::Approved);
        assert!("submitting".parse::<RequestStatus>().is_err());
        assert!("".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_db_status_parse_is_strict() {
        assert_eq!(RequestStatus::from_db("submitting").unwrap(), RequestStatus::Submitting);
        assert!(matches!(RequestStatus::from_db("Pending"), Err(StoreError::Unmarshal(_))));
    }

    #[test]
    fn test_display_name_joins_first_and_last() {
        assert_eq!(Submitter::new("u1", "Ada", "Lovelace").display_name(), "Ada Lovelace");
        assert_eq!(Submitter::new("u1", "Ada", "").display_name(), "Ada");
    }
}
