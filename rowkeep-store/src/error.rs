//! Error types for rowkeep-store
//!
//! User-correctable errors (`Parse`, `DuplicateName`, `NotFound`,
//! `InvalidInput`) are reported verbatim. Store-consistency faults
//! (`Unmarshal`, `RowNotFound`) indicate corrupted state: they are logged with
//! full context by the caller and reported to end users generically through
//! [`StoreError::public_message`].

use thiserror::Error;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    /// Uploaded file is malformed, empty, or has an unusable header
    #[error("Parse error: {0}")]
    Parse(String),

    /// A live dataset with the same name already exists
    #[error("Dataset name already exists: {0}")]
    DuplicateName(String),

    /// Unknown dataset, version, request, attachment, or request not pending
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored row data could not be decoded
    #[error("Stored data corrupted: {0}")]
    Unmarshal(String),

    /// Staging a media upload failed
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Copying or deleting objects during relocation failed
    #[error("Relocation failed: {0}")]
    Relocation(String),

    /// An existing-row edit points at a row that no longer exists
    #[error("Row not found: dataset {dataset_id}, row {row_id}")]
    RowNotFound { dataset_id: i64, row_id: i64 },

    /// Invalid request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The caller cancelled an in-flight object-store operation
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Unexpected failure while producing a result (e.g. report encoding)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Object store I/O failure outside staging/relocation
    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// rowkeep-common error
    #[error("Common error: {0}")]
    Common(#[from] rowkeep_common::Error),
}

impl StoreError {
    /// True for errors that indicate corrupted or inconsistent stored state
    pub fn is_internal_fault(&self) -> bool {
        matches!(
            self,
            StoreError::Unmarshal(_)
                | StoreError::RowNotFound { .. }
                | StoreError::Internal(_)
                | StoreError::Database(_)
                | StoreError::Common(_)
                | StoreError::ObjectStore(_)
        )
    }

    /// Message safe to show an end user
    pub fn public_message(&self) -> String {
        if self.is_internal_fault() {
            "Internal error, the operation was not applied".to_string()
        } else {
            self.to_string()
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors_are_reported_verbatim() {
        let err = StoreError::Parse("no data rows".to_string());
        assert!(!err.is_internal_fault());
        assert_eq!(err.public_message(), "Parse error: no data rows");
    }

    #[test]
    fn test_consistency_faults_are_hidden() {
        let err = StoreError::RowNotFound { dataset_id: 3, row_id: 99 };
        assert!(err.is_internal_fault());
        assert!(!err.public_message().contains("99"));

        let err = StoreError::Unmarshal("expected object".to_string());
        assert!(err.is_internal_fault());
        assert!(!err.public_message().contains("expected object"));
    }

    #[test]
    fn test_relocation_error_surfaces_cause() {
        let err = StoreError::Relocation("copy 12/a.jpg failed".to_string());
        assert!(!err.is_internal_fault());
        assert!(err.public_message().contains("copy 12/a.jpg failed"));
    }
}
