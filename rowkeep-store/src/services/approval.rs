//! Approval orchestrator
//!
//! Existing-row edits are merged in a single transaction. New-row requests
//! bind a permanent row identity in three steps so that no database
//! transaction is held open while objects move:
//!
//! ```text
//! pending/unbound --bind--> pending/bound --move--> (objects relocated) --finish--> approved
//!        ^                        |                          |
//!        +--------unbind----------+--------------------------+
//! ```
//!
//! `bind` mints the row and back-fills its id, recording the staging prefix
//! as a relocation marker. `finish` rewrites attachment locators and marks
//! the request approved. While bound, the minted row is hidden from reads
//! and from revert copies. A failure after `bind` runs the compensating
//! `unbind`, which moves relocated objects back and deletes the minted row.
//! Requests found `bound` at startup were interrupted by a crash and are
//! unbound by [`ApprovalOrchestrator::recover_interrupted_approvals`].

use crate::db::{datasets, edit_requests, media};
use crate::error::{StoreError, StoreResult};
use crate::models::{DetailOverride, EditRequest, EditRequestDetail, RowFields};
use crate::services::dataset_store;
use crate::services::media_manager::{row_prefix, staging_prefix, MediaManager, RelocatedObject};
use crate::storage::basename;
use rowkeep_common::time;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of a successful approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub request_id: i64,
    /// Minted row for new-row requests, edited row otherwise
    pub row_id: i64,
    pub new_row: bool,
    pub relocated: usize,
}

/// A request bound to a freshly minted row, between `bind` and `finish`
#[derive(Debug, Clone)]
struct BoundRequest {
    request_id: i64,
    dataset_id: i64,
    row_id: i64,
    staging_prefix: String,
}

/// Fold details over field names in id order; later details win
pub fn merge_details(column_order: &[String], details: &[EditRequestDetail]) -> RowFields {
    let mut fields = RowFields::from_columns(column_order, &[]);
    for detail in details {
        fields.set(&detail.field_name, detail.new_value.clone());
    }
    fields
}

/// Claim the request and apply reviewer overrides
///
/// Must run first in its transaction; the claim is the write that takes the
/// database lock.
async fn claim_and_load(
    conn: &mut SqliteConnection,
    request_id: i64,
    overrides: &[DetailOverride],
) -> StoreResult<(EditRequest, Vec<EditRequestDetail>)> {
    if !edit_requests::claim_pending(conn, request_id).await? {
        return Err(StoreError::NotFound(format!("Edit request {} is not pending", request_id)));
    }

    for item in overrides {
        if !edit_requests::override_detail(conn, request_id, item.detail_id, &item.new_value).await? {
            return Err(StoreError::InvalidInput(format!(
                "Detail {} does not belong to edit request {}",
                item.detail_id, request_id
            )));
        }
    }

    let request = edit_requests::load_request(conn, request_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Edit request {}", request_id)))?;
    let details = edit_requests::load_details(conn, request_id).await?;
    Ok((request, details))
}

/// Merges approved changes into the versioned store
#[derive(Clone)]
pub struct ApprovalOrchestrator {
    db: SqlitePool,
    media: Arc<MediaManager>,
}

impl ApprovalOrchestrator {
    pub fn new(db: SqlitePool, media: Arc<MediaManager>) -> Self {
        Self { db, media }
    }

    /// Approve a pending request, all-or-nothing
    ///
    /// # Returns
    /// * `Err(StoreError::NotFound)` - request missing, decided, or mid-approval
    /// * `Err(StoreError::RowNotFound)` - an existing-row edit targets a missing row
    /// * `Err(StoreError::Relocation)` / `Err(StoreError::Cancelled)` - media
    ///   could not be moved; the request is still pending
    pub async fn approve(
        &self,
        request_id: i64,
        overrides: &[DetailOverride],
        approver_id: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<ApprovalOutcome> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled(format!("approval of edit request {}", request_id)));
        }

        let mut tx = self.db.begin().await?;
        let (request, details) = claim_and_load(&mut tx, request_id, overrides).await?;

        if request.existing_row {
            let outcome = self.merge_existing(&mut tx, &request, &details, approver_id).await?;
            tx.commit().await?;
            info!(request_id, row_id = outcome.row_id, approver = approver_id, "Existing-row edit approved");
            return Ok(outcome);
        }

        let bound = self.bind(&mut tx, &request, &details).await?;
        tx.commit().await?;
        debug!(request_id, row_id = bound.row_id, "Request bound to new row");

        let moves = match self
            .media
            .relocate(&bound.staging_prefix, &row_prefix(bound.row_id), cancel)
            .await
        {
            Ok(moves) => moves,
            Err(e) => {
                warn!(request_id, row_id = bound.row_id, error = %e, "Media relocation failed, unbinding");
                self.unbind(&bound, &[]).await;
                return Err(e);
            }
        };

        if let Err(e) = self.finish(&bound, &moves, approver_id).await {
            error!(request_id, row_id = bound.row_id, error = %e, "Finishing approval failed, unbinding");
            self.unbind(&bound, &moves).await;
            return Err(e);
        }

        info!(
            request_id,
            dataset_id = bound.dataset_id,
            row_id = bound.row_id,
            relocated = moves.len(),
            approver = approver_id,
            "New-row request approved"
        );
        Ok(ApprovalOutcome {
            request_id,
            row_id: bound.row_id,
            new_row: true,
            relocated: moves.len(),
        })
    }

    /// Overwrite one field per detail on the referenced row
    async fn merge_existing(
        &self,
        conn: &mut SqliteConnection,
        request: &EditRequest,
        details: &[EditRequestDetail],
        approver_id: &str,
    ) -> StoreResult<ApprovalOutcome> {
        let row_id = request.row_id.ok_or_else(|| {
            StoreError::Unmarshal(format!("Existing-row edit request {} has no row id", request.id))
        })?;

        for detail in details {
            let mut fields = dataset_store::load_row(conn, request.dataset_id, row_id)
                .await
                .map_err(|e| {
                    error!(
                        request_id = request.id,
                        dataset_id = request.dataset_id,
                        row_id,
                        detail_id = detail.id,
                        error = %e,
                        "Cannot load row for existing-row edit"
                    );
                    e
                })?;
            fields.set(&detail.field_name, detail.new_value.clone());
            dataset_store::update_row_fields(conn, row_id, &fields).await?;
        }

        if !edit_requests::mark_approved(conn, request.id, approver_id, &time::now()).await? {
            return Err(StoreError::NotFound(format!("Edit request {} is not pending", request.id)));
        }

        Ok(ApprovalOutcome {
            request_id: request.id,
            row_id,
            new_row: false,
            relocated: 0,
        })
    }

    /// Mint the row and back-fill its id onto the request and every detail
    async fn bind(
        &self,
        conn: &mut SqliteConnection,
        request: &EditRequest,
        details: &[EditRequestDetail],
    ) -> StoreResult<BoundRequest> {
        let dataset = datasets::require_dataset(conn, request.dataset_id).await?;
        let fields = merge_details(&dataset.column_order, details);
        let row_id = dataset_store::insert_row(conn, dataset.id, &fields).await?;

        let prefix = staging_prefix(request.id, &request.submitter);
        edit_requests::bind_row(conn, request.id, row_id, &prefix).await?;

        Ok(BoundRequest {
            request_id: request.id,
            dataset_id: dataset.id,
            row_id,
            staging_prefix: prefix,
        })
    }

    /// Point attachments at their relocated objects and mark approved
    async fn finish(&self, bound: &BoundRequest, moves: &[RelocatedObject], approver_id: &str) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;

        let attachments = media::list_for_request(&mut tx, bound.request_id).await?;
        for attachment in &attachments {
            let new_locator = moves
                .iter()
                .find(|m| m.from == attachment.locator)
                .map(|m| m.to.clone())
                .unwrap_or_else(|| format!("{}{}", row_prefix(bound.row_id), basename(&attachment.locator)));
            media::set_location(&mut tx, attachment.id, bound.row_id, &new_locator).await?;
        }

        if !edit_requests::mark_approved(&mut tx, bound.request_id, approver_id, &time::now()).await? {
            return Err(StoreError::NotFound(format!("Edit request {} is not pending", bound.request_id)));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Compensate a failed approval, best-effort
    ///
    /// Objects are moved back before the row identity is released so a
    /// crash in between leaves the request `bound` and recoverable.
    async fn unbind(&self, bound: &BoundRequest, moves: &[RelocatedObject]) {
        if !moves.is_empty() {
            let restored = self.media.move_back(moves).await;
            if restored != moves.len() {
                error!(
                    request_id = bound.request_id,
                    restored,
                    expected = moves.len(),
                    "Not every relocated object could be moved back"
                );
            }
        }

        if let Err(e) = self.release_row(bound).await {
            error!(
                request_id = bound.request_id,
                row_id = bound.row_id,
                error = %e,
                "Unbind failed; request stays bound until recovery"
            );
        }
    }

    async fn release_row(&self, bound: &BoundRequest) -> StoreResult<bool> {
        let mut tx = self.db.begin().await?;
        if !edit_requests::unbind_row(&mut tx, bound.request_id).await? {
            return Ok(false);
        }
        dataset_store::remove_inserted_row(&mut tx, bound.dataset_id, bound.row_id).await?;
        tx.commit().await?;
        debug!(request_id = bound.request_id, row_id = bound.row_id, "Request unbound");
        Ok(true)
    }

    /// Unbind every request left `bound` by an interrupted approval
    ///
    /// Returns how many requests were returned to pending.
    pub async fn recover_interrupted_approvals(&self) -> StoreResult<usize> {
        let bound_requests = {
            let mut conn = self.db.acquire().await?;
            edit_requests::list_bound(&mut conn).await?
        };

        let mut recovered = 0;
        for request in bound_requests {
            let Some(row_id) = request.row_id else {
                warn!(request_id = request.id, "Bound request without row id");
                continue;
            };
            let prefix = request
                .relocation_prefix
                .clone()
                .unwrap_or_else(|| staging_prefix(request.id, &request.submitter));

            let attachments = {
                let mut conn = self.db.acquire().await?;
                media::list_for_request(&mut conn, request.id).await?
            };

            // Only objects actually present under the row prefix were moved
            let present = self.media.list_prefix(&row_prefix(row_id)).await?;
            let moves: Vec<RelocatedObject> = attachments
                .iter()
                .filter(|a| a.locator.starts_with(&prefix))
                .map(|a| RelocatedObject {
                    from: a.locator.clone(),
                    to: format!("{}{}", row_prefix(row_id), basename(&a.locator)),
                })
                .filter(|m| present.contains(&m.to))
                .collect();

            let bound = BoundRequest {
                request_id: request.id,
                dataset_id: request.dataset_id,
                row_id,
                staging_prefix: prefix,
            };

            if !moves.is_empty() {
                self.media.move_back(&moves).await;
            }
            if self.release_row(&bound).await? {
                info!(request_id = request.id, row_id, moved_back = moves.len(), "Recovered interrupted approval");
                recovered += 1;
            }
        }

        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn detail(id: i64, field: &str, old: &str, new: &str) -> EditRequestDetail {
        EditRequestDetail {
            id,
            request_id: 1,
            dataset_id: 1,
            row_id: None,
            field_name: field.to_string(),
            old_value: old.to_string(),
            new_value: new.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_later_details_win() {
        let columns = vec!["name".to_string(), "city".to_string()];
        let merged = merge_details(
            &columns,
            &[detail(1, "name", "", "Ada"), detail(2, "name", "", "Grace")],
        );
        assert_eq!(merged.get("name"), Some("Grace"));
        assert_eq!(merged.get("city"), Some(""));
    }

    #[test]
    fn test_void_detail_contributes_empty_value() {
        let columns = vec!["name".to_string()];
        let merged = merge_details(&columns, &[detail(1, "name", "", "Ada"), detail(2, "name", "", "")]);
        assert_eq!(merged.get("name"), Some(""));
    }

    #[test]
    fn test_unknown_fields_are_appended() {
        let columns = vec!["name".to_string()];
        let merged = merge_details(&columns, &[detail(1, "notes", "", "x")]);
        assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["name", "notes"]);
    }
}
