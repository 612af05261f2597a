//! Edit request ledger
//!
//! Submission runs in two short transactions around the media uploads: the
//! request is written in the internal `submitting` state, media is staged,
//! then attachments are recorded and the request becomes `pending`. A failed
//! upload deletes the request again, so listings never show a partial one.

use crate::db::{datasets, edit_requests, media};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    EditRequestRecord, FieldChange, MediaUpload, RequestStatus, SubmissionMeta, Submitter,
};
use crate::services::media_manager::{row_prefix, staging_prefix, MediaManager};
use rowkeep_common::time;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Number of non-void changes proposed for one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChangeCount {
    pub field_name: String,
    pub changes: u64,
}

/// Resolve the listing filter
///
/// No arguments lists pending requests. A valid, non-empty status list is
/// used as given, combined with the submitter when present. Anything else
/// (an unparseable or empty status list, or a submitter alone) falls back
/// to pending-only.
pub fn resolve_list_filter(
    statuses: Option<&[String]>,
    submitter_id: Option<&str>,
) -> (Vec<RequestStatus>, Option<String>) {
    let pending_only = (vec![RequestStatus::Pending], None);

    let Some(statuses) = statuses else {
        return pending_only;
    };
    if statuses.is_empty() {
        return pending_only;
    }

    let parsed: Result<Vec<RequestStatus>, _> = statuses.iter().map(|s| s.parse()).collect();
    match parsed {
        Ok(mut parsed) => {
            parsed.dedup();
            (parsed, submitter_id.map(str::to_string))
        }
        Err(_) => pending_only,
    }
}

async fn load_record(conn: &mut SqliteConnection, request_id: i64) -> StoreResult<Option<EditRequestRecord>> {
    let Some(request) = edit_requests::load_request(conn, request_id).await? else {
        return Ok(None);
    };
    let details = edit_requests::load_details(conn, request_id).await?;
    let attachments = media::list_for_request(conn, request_id).await?;
    Ok(Some(EditRequestRecord { request, details, attachments }))
}

/// Records proposed field-level changes and their reviewer decisions
#[derive(Clone)]
pub struct EditLedger {
    db: SqlitePool,
    media: Arc<MediaManager>,
}

impl EditLedger {
    pub fn new(db: SqlitePool, media: Arc<MediaManager>) -> Self {
        Self { db, media }
    }

    /// Submit an edit request
    ///
    /// # Arguments
    /// * `row_ref` - `None` proposes a new row; `Some(row_id)` edits that row
    ///
    /// # Returns
    /// * `Err(StoreError::Upload)` - a media upload failed; nothing was recorded
    #[allow(clippy::too_many_arguments)]
    pub async fn submit(
        &self,
        dataset_id: i64,
        row_ref: Option<i64>,
        changes: &[FieldChange],
        uploads: &[MediaUpload],
        submitter: &Submitter,
        meta: &SubmissionMeta,
        cancel: &CancellationToken,
    ) -> StoreResult<EditRequestRecord> {
        if changes.is_empty() {
            return Err(StoreError::InvalidInput("An edit request needs at least one field change".to_string()));
        }
        if let Some(change) = changes.iter().find(|c| c.field_name.trim().is_empty()) {
            return Err(StoreError::InvalidInput(format!(
                "Field change with blank field name (new value '{}')",
                change.new_value
            )));
        }
        if submitter.user_id.trim().is_empty() {
            return Err(StoreError::InvalidInput("Submitter id is empty".to_string()));
        }

        {
            let mut conn = self.db.acquire().await?;
            datasets::require_dataset(&mut conn, dataset_id).await?;
        }

        let now = time::now();
        let mut tx = self.db.begin().await?;
        let request_id =
            edit_requests::insert_request(&mut tx, dataset_id, row_ref, submitter, meta, &now).await?;
        for change in changes {
            edit_requests::insert_detail(&mut tx, request_id, dataset_id, row_ref, change, &now).await?;
        }
        tx.commit().await?;

        let prefix = match row_ref {
            Some(row_id) => row_prefix(row_id),
            None => staging_prefix(request_id, submitter),
        };

        let mut staged: Vec<(String, &MediaUpload)> = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self.media.stage(upload, &prefix, cancel).await {
                Ok(locator) => staged.push((locator, upload)),
                Err(e) => {
                    warn!(request_id, dataset_id, error = %e, "Media upload failed, abandoning submission");
                    self.abandon(request_id, &staged).await;
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.record_attachments(request_id, row_ref, &staged).await {
            warn!(request_id, error = %e, "Recording attachments failed, abandoning submission");
            self.abandon(request_id, &staged).await;
            return Err(e);
        }

        info!(
            request_id,
            dataset_id,
            row_id = ?row_ref,
            changes = changes.len(),
            attachments = staged.len(),
            submitter = %submitter.user_id,
            "Edit request submitted"
        );
        self.get(request_id).await
    }

    async fn record_attachments(
        &self,
        request_id: i64,
        row_ref: Option<i64>,
        staged: &[(String, &MediaUpload)],
    ) -> StoreResult<()> {
        let now = time::now();
        let mut tx = self.db.begin().await?;
        for (locator, upload) in staged {
            media::insert_attachment(
                &mut tx,
                &media::NewAttachment {
                    request_id,
                    row_id: row_ref,
                    bucket: self.media.bucket(),
                    locator,
                    original_filename: &upload.filename,
                    content_type: upload.content_type.as_deref(),
                    byte_size: upload.bytes.len() as i64,
                    kind: upload.kind,
                    category: &upload.category,
                },
                &now,
            )
            .await?;
        }
        if !edit_requests::mark_submitted(&mut tx, request_id).await? {
            return Err(StoreError::NotFound(format!("Edit request {} vanished during submission", request_id)));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Remove staged objects and the half-written request
    async fn abandon(&self, request_id: i64, staged: &[(String, &MediaUpload)]) {
        let keys: Vec<String> = staged.iter().map(|(locator, _)| locator.clone()).collect();
        self.media.discard(&keys).await;

        if let Err(e) = self.delete_request(request_id).await {
            warn!(request_id, error = %e, "Could not delete abandoned edit request");
        }
    }

    async fn delete_request(&self, request_id: i64) -> StoreResult<()> {
        let mut conn = self.db.acquire().await?;
        edit_requests::delete_request(&mut conn, request_id).await
    }

    /// List requests with their details and attachments, by request id
    pub async fn list(
        &self,
        statuses: Option<&[String]>,
        submitter_id: Option<&str>,
    ) -> StoreResult<Vec<EditRequestRecord>> {
        let (statuses, submitter_id) = resolve_list_filter(statuses, submitter_id);
        debug!(statuses = ?statuses, submitter = ?submitter_id, "Listing edit requests");

        let mut conn = self.db.acquire().await?;
        let requests = edit_requests::list_requests(&mut conn, &statuses, submitter_id.as_deref()).await?;

        let mut records = Vec::with_capacity(requests.len());
        for request in requests {
            let details = edit_requests::load_details(&mut conn, request.id).await?;
            let attachments = media::list_for_request(&mut conn, request.id).await?;
            records.push(EditRequestRecord { request, details, attachments });
        }
        Ok(records)
    }

    pub async fn get(&self, request_id: i64) -> StoreResult<EditRequestRecord> {
        let mut conn = self.db.acquire().await?;
        match load_record(&mut conn, request_id).await? {
            Some(record) if record.request.status != RequestStatus::Submitting => Ok(record),
            _ => Err(StoreError::NotFound(format!("Edit request {}", request_id))),
        }
    }

    /// Reject a pending request; its media stays where it is
    pub async fn reject(&self, request_id: i64, reviewer_id: &str) -> StoreResult<()> {
        let mut conn = self.db.acquire().await?;
        if !edit_requests::mark_rejected(&mut conn, request_id, reviewer_id, &time::now()).await? {
            return Err(StoreError::NotFound(format!("Edit request {} is not pending", request_id)));
        }
        info!(request_id, reviewer = reviewer_id, "Edit request rejected");
        Ok(())
    }

    /// Per-field counts of non-void proposed changes on a dataset
    pub async fn change_summary(&self, dataset_id: i64) -> StoreResult<Vec<FieldChangeCount>> {
        let mut conn = self.db.acquire().await?;
        datasets::require_dataset(&mut conn, dataset_id).await?;

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for (detail, _) in edit_requests::load_dataset_details(&mut conn, dataset_id).await? {
            if detail.is_void() {
                continue;
            }
            *counts.entry(detail.field_name).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(field_name, changes)| FieldChangeCount { field_name, changes })
            .collect())
    }

    /// CSV export of every non-void proposed change on a dataset
    pub async fn export_changes_csv(&self, dataset_id: i64) -> StoreResult<String> {
        let mut conn = self.db.acquire().await?;
        datasets::require_dataset(&mut conn, dataset_id).await?;
        let details = edit_requests::load_dataset_details(&mut conn, dataset_id).await?;

        let csv_error = |e: csv::Error| StoreError::Internal(format!("CSV export failed: {}", e));
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["request_id", "status", "row_id", "field_name", "old_value", "new_value", "created_at"])
            .map_err(csv_error)?;

        let mut exported = 0;
        for (detail, status) in details.iter().filter(|(d, _)| !d.is_void()) {
            writer
                .write_record([
                    detail.request_id.to_string(),
                    status.as_str().to_string(),
                    detail.row_id.map(|id| id.to_string()).unwrap_or_default(),
                    detail.field_name.clone(),
                    detail.old_value.clone(),
                    detail.new_value.clone(),
                    time::to_db(&detail.created_at),
                ])
                .map_err(csv_error)?;
            exported += 1;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::Internal(format!("CSV export failed: {}", e)))?;
        debug!(dataset_id, exported, "Exported change log");
        String::from_utf8(bytes).map_err(|e| StoreError::Internal(format!("CSV export failed: {}", e)))
    }
}
