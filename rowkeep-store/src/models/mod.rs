//! Data models

pub mod dataset;
pub mod edit_request;
pub mod media;
pub mod row_fields;

pub use dataset::{DataRow, Dataset, DatasetVersion, SourceInfo, Visibility};
pub use edit_request::{
    BindingState, ConsentFlags, DetailOverride, EditRequest, EditRequestDetail, EditRequestRecord,
    FieldChange, RequestStatus, SubmissionMeta, Submitter,
};
pub use media::{MediaAttachment, MediaKind, MediaUpload, ModerationStatus};
pub use row_fields::RowFields;
