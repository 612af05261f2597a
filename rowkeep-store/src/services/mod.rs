//! Store services: versioned datasets, edit ledger, media, approval

pub mod access;
pub mod approval;
pub mod audit;
pub mod dataset_store;
pub mod edit_ledger;
pub mod media_manager;

pub use access::{RoleLookup, StaticRoleLookup};
pub use approval::{ApprovalOrchestrator, ApprovalOutcome};
pub use audit::{AuditEntry, AuditSink, SqliteAuditSink, TracingAuditSink};
pub use dataset_store::VersionedStore;
pub use edit_ledger::{EditLedger, FieldChangeCount};
pub use media_manager::{MediaManager, RelocatedObject};
