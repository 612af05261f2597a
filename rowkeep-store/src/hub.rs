//! Hub facade
//!
//! Wires the parser, versioned store, edit ledger, media manager, approval
//! orchestrator, role lookup and audit sink behind one set of operations.
//! Every mutating operation writes a best-effort audit entry.

use crate::config::{resolve_media_settings, MediaSettings};
use crate::error::StoreResult;
use crate::models::{
    DataRow, Dataset, DatasetVersion, DetailOverride, EditRequestRecord, FieldChange,
    MediaAttachment, MediaUpload, SourceInfo, SubmissionMeta, Submitter, Visibility,
};
use crate::parser::{parse_table, FileFormat};
use crate::services::access::{is_admin, RoleLookup};
use crate::services::audit::{record, AuditEntry, AuditSink, SqliteAuditSink};
use crate::services::{
    ApprovalOrchestrator, ApprovalOutcome, EditLedger, FieldChangeCount, MediaManager, VersionedStore,
};
use crate::storage::{LocalObjectStore, ObjectStore};
use rowkeep_common::config::{RootFolderInitializer, TomlConfig};
use rowkeep_common::db::init_database;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Log internal faults with full context before they reach a caller
fn observe<T>(operation: &str, result: StoreResult<T>) -> StoreResult<T> {
    if let Err(e) = &result {
        if e.is_internal_fault() {
            error!(operation, error = %e, "Internal fault");
        }
    }
    result
}

/// Every store operation behind one handle
#[derive(Clone)]
pub struct Hub {
    db: SqlitePool,
    store: VersionedStore,
    ledger: EditLedger,
    media: Arc<MediaManager>,
    approvals: ApprovalOrchestrator,
    roles: Arc<dyn RoleLookup>,
    audit: Arc<dyn AuditSink>,
}

impl Hub {
    pub fn new(
        db: SqlitePool,
        objects: Arc<dyn ObjectStore>,
        media_settings: MediaSettings,
        roles: Arc<dyn RoleLookup>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let media = Arc::new(MediaManager::new(db.clone(), objects, media_settings));
        Self {
            store: VersionedStore::new(db.clone()),
            ledger: EditLedger::new(db.clone(), Arc::clone(&media)),
            approvals: ApprovalOrchestrator::new(db.clone(), Arc::clone(&media)),
            media,
            roles,
            audit,
            db,
        }
    }

    /// Open the database under a root folder with a filesystem object store
    pub async fn open_local(
        root: &RootFolderInitializer,
        toml_config: &TomlConfig,
        roles: Arc<dyn RoleLookup>,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> StoreResult<Self> {
        root.ensure_directory_exists()?;
        let db = init_database(&root.database_path()).await?;
        let media_settings = resolve_media_settings(&db, toml_config).await?;

        let media_root = toml_config.media_root.clone().unwrap_or_else(|| root.media_path());
        info!(media_root = %media_root.display(), bucket = %media_settings.bucket, "Using local object store");
        let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(media_root));

        let audit: Arc<dyn AuditSink> = match audit {
            Some(audit) => audit,
            None => Arc::new(SqliteAuditSink::new(db.clone())),
        };
        Ok(Self::new(db, objects, media_settings, roles, audit))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    async fn log_audit(&self, entry: AuditEntry) {
        record(self.audit.as_ref(), entry).await;
    }

    // Datasets

    pub async fn ingest_dataset(
        &self,
        name: &str,
        file_bytes: &[u8],
        format: FileFormat,
        visibility: Visibility,
        actor: &str,
    ) -> StoreResult<Dataset> {
        let table = parse_table(file_bytes, format)?;
        let source = SourceInfo::from_bytes(file_bytes);
        let dataset = observe("ingest", self.store.ingest(name, &table, visibility, &source, actor).await)?;

        self.log_audit(
            AuditEntry::new(actor, "dataset.ingest", format!("dataset:{}", dataset.id))
                .with_detail(format!("{} rows, name '{}'", dataset.row_count, dataset.name)),
        )
        .await;
        Ok(dataset)
    }

    pub async fn replace_dataset(
        &self,
        dataset_id: i64,
        file_bytes: &[u8],
        format: FileFormat,
        actor: &str,
    ) -> StoreResult<Dataset> {
        let table = parse_table(file_bytes, format)?;
        let source = SourceInfo::from_bytes(file_bytes);
        let dataset = observe("replace", self.store.replace(dataset_id, &table, &source, actor).await)?;

        self.log_audit(
            AuditEntry::new(actor, "dataset.replace", format!("dataset:{}", dataset_id))
                .with_detail(format!("version {}", dataset.current_version)),
        )
        .await;
        Ok(dataset)
    }

    pub async fn revert_dataset(&self, dataset_id: i64, target_version: i64, actor: &str) -> StoreResult<Dataset> {
        let dataset = observe("revert", self.store.revert(dataset_id, target_version, actor).await)?;

        self.log_audit(
            AuditEntry::new(actor, "dataset.revert", format!("dataset:{}", dataset_id)).with_detail(format!(
                "version {} from version {}",
                dataset.current_version, target_version
            )),
        )
        .await;
        Ok(dataset)
    }

    pub async fn read_dataset_rows(&self, dataset_id: i64, version: i64) -> StoreResult<Vec<DataRow>> {
        observe("read", self.store.read(dataset_id, version).await)
    }

    pub async fn get_dataset(&self, dataset_id: i64) -> StoreResult<Dataset> {
        observe("get_dataset", self.store.get(dataset_id).await)
    }

    pub async fn list_versions(&self, dataset_id: i64) -> StoreResult<Vec<DatasetVersion>> {
        observe("list_versions", self.store.list_versions(dataset_id).await)
    }

    pub async fn list_datasets(&self, reader_id: &str) -> StoreResult<Vec<Dataset>> {
        let admin = is_admin(self.roles.as_ref(), reader_id).await?;
        observe("list_datasets", self.store.list_datasets(reader_id, admin).await)
    }

    pub async fn grant_access(&self, dataset_id: i64, user_id: &str, actor: &str) -> StoreResult<()> {
        observe("grant_access", self.store.grant_access(dataset_id, user_id).await)?;
        self.log_audit(
            AuditEntry::new(actor, "dataset.grant", format!("dataset:{}", dataset_id)).with_detail(user_id),
        )
        .await;
        Ok(())
    }

    pub async fn delete_dataset(&self, dataset_id: i64, actor: &str) -> StoreResult<()> {
        observe("delete_dataset", self.store.soft_delete(dataset_id).await)?;
        self.log_audit(AuditEntry::new(actor, "dataset.delete", format!("dataset:{}", dataset_id)))
            .await;
        Ok(())
    }

    // Edit requests

    #[allow(clippy::too_many_arguments)]
    pub async fn submit_edit_request(
        &self,
        dataset_id: i64,
        row_ref: Option<i64>,
        changes: &[FieldChange],
        uploads: &[MediaUpload],
        submitter: &Submitter,
        meta: &SubmissionMeta,
        cancel: &CancellationToken,
    ) -> StoreResult<EditRequestRecord> {
        let record = observe(
            "submit",
            self.ledger
                .submit(dataset_id, row_ref, changes, uploads, submitter, meta, cancel)
                .await,
        )?;

        self.log_audit(
            AuditEntry::new(&submitter.user_id, "edit_request.submit", format!("edit_request:{}", record.request.id))
                .with_detail(format!("dataset:{} by {}", dataset_id, submitter.display_name())),
        )
        .await;
        Ok(record)
    }

    pub async fn list_edit_requests(
        &self,
        statuses: Option<&[String]>,
        submitter_id: Option<&str>,
    ) -> StoreResult<Vec<EditRequestRecord>> {
        observe("list_edit_requests", self.ledger.list(statuses, submitter_id).await)
    }

    pub async fn get_edit_request(&self, request_id: i64) -> StoreResult<EditRequestRecord> {
        observe("get_edit_request", self.ledger.get(request_id).await)
    }

    pub async fn approve_edit_request(
        &self,
        request_id: i64,
        overrides: &[DetailOverride],
        approver_id: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<ApprovalOutcome> {
        let outcome = observe(
            "approve",
            self.approvals.approve(request_id, overrides, approver_id, cancel).await,
        )?;

        self.log_audit(
            AuditEntry::new(approver_id, "edit_request.approve", format!("edit_request:{}", request_id))
                .with_detail(format!("row:{}", outcome.row_id)),
        )
        .await;
        Ok(outcome)
    }

    pub async fn reject_edit_request(&self, request_id: i64, reviewer_id: &str) -> StoreResult<()> {
        observe("reject", self.ledger.reject(request_id, reviewer_id).await)?;
        self.log_audit(AuditEntry::new(
            reviewer_id,
            "edit_request.reject",
            format!("edit_request:{}", request_id),
        ))
        .await;
        Ok(())
    }

    pub async fn change_summary(&self, dataset_id: i64) -> StoreResult<Vec<FieldChangeCount>> {
        observe("change_summary", self.ledger.change_summary(dataset_id).await)
    }

    pub async fn export_changes(&self, dataset_id: i64) -> StoreResult<String> {
        observe("export_changes", self.ledger.export_changes_csv(dataset_id).await)
    }

    pub async fn recover_interrupted_approvals(&self) -> StoreResult<usize> {
        let recovered = observe("recover", self.approvals.recover_interrupted_approvals().await)?;
        if recovered > 0 {
            self.log_audit(
                AuditEntry::new("system", "edit_request.recover", "edit_requests")
                    .with_detail(format!("{} interrupted approvals returned to pending", recovered)),
            )
            .await;
        }
        Ok(recovered)
    }

    // Media

    pub async fn approve_photos(&self, ids: &[i64], reviewer_id: &str) -> StoreResult<()> {
        observe("approve_photos", self.media.approve_photos(ids, reviewer_id).await)?;
        self.log_audit(
            AuditEntry::new(reviewer_id, "media.approve", "media_attachments").with_detail(format!("{:?}", ids)),
        )
        .await;
        Ok(())
    }

    pub async fn reject_photos(&self, ids: &[i64], reviewer_id: &str) -> StoreResult<()> {
        observe("reject_photos", self.media.reject_photos(ids, reviewer_id).await)?;
        self.log_audit(
            AuditEntry::new(reviewer_id, "media.reject", "media_attachments").with_detail(format!("{:?}", ids)),
        )
        .await;
        Ok(())
    }

    pub async fn fetch_attachment(&self, attachment_id: i64) -> StoreResult<(MediaAttachment, Vec<u8>)> {
        observe("fetch_attachment", self.media.fetch(attachment_id).await)
    }
}
