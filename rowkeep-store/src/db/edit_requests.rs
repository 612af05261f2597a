//! Edit requests and their field-level details

use super::{encode_list, optional_timestamp, string_list, timestamp};
use crate::error::StoreResult;
use crate::models::{
    BindingState, ConsentFlags, EditRequest, EditRequestDetail, FieldChange, RequestStatus,
    SubmissionMeta, Submitter,
};
use chrono::{DateTime, Utc};
use rowkeep_common::time;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

const REQUEST_COLUMNS: &str = "id, dataset_id, row_id, submitter_id, submitter_first_name, \
     submitter_last_name, status, existing_row, consent_publish, consent_contact, community_tags, \
     binding_state, relocation_prefix, approved_by, approved_at, rejected_by, rejected_at, \
     created_at, updated_at";

fn map_request(row: &SqliteRow) -> StoreResult<EditRequest> {
    let status: String = row.try_get("status")?;
    let binding: String = row.try_get("binding_state")?;

    Ok(EditRequest {
        id: row.try_get("id")?,
        dataset_id: row.try_get("dataset_id")?,
        row_id: row.try_get("row_id")?,
        submitter: Submitter {
            user_id: row.try_get("submitter_id")?,
            first_name: row.try_get("submitter_first_name")?,
            last_name: row.try_get("submitter_last_name")?,
        },
        status: RequestStatus::from_db(&status)?,
        existing_row: row.try_get("existing_row")?,
        consent: ConsentFlags {
            publish: row.try_get("consent_publish")?,
            contact: row.try_get("consent_contact")?,
        },
        community_tags: string_list(row, "community_tags")?,
        binding_state: BindingState::from_db(&binding)?,
        relocation_prefix: row.try_get("relocation_prefix")?,
        approved_by: row.try_get("approved_by")?,
        approved_at: optional_timestamp(row, "approved_at")?,
        rejected_by: row.try_get("rejected_by")?,
        rejected_at: optional_timestamp(row, "rejected_at")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn map_detail(row: &SqliteRow) -> StoreResult<EditRequestDetail> {
    Ok(EditRequestDetail {
        id: row.try_get("id")?,
        request_id: row.try_get("request_id")?,
        dataset_id: row.try_get("dataset_id")?,
        row_id: row.try_get("row_id")?,
        field_name: row.try_get("field_name")?,
        old_value: row.try_get("old_value")?,
        new_value: row.try_get("new_value")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn map_detail_with_status(row: &SqliteRow) -> StoreResult<(EditRequestDetail, RequestStatus)> {
    let status: String = row.try_get("status")?;
    Ok((map_detail(row)?, RequestStatus::from_db(&status)?))
}

/// Insert a request header in `submitting` state
pub async fn insert_request(
    conn: &mut SqliteConnection,
    dataset_id: i64,
    row_id: Option<i64>,
    submitter: &Submitter,
    meta: &SubmissionMeta,
    created_at: &DateTime<Utc>,
) -> StoreResult<i64> {
    let now = time::to_db(created_at);
    let request_id = sqlx::query(
        r#"
        INSERT INTO edit_requests (
            dataset_id, row_id, submitter_id, submitter_first_name, submitter_last_name,
            status, existing_row, consent_publish, consent_contact, community_tags,
            binding_state, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, 'submitting', ?, ?, ?, ?, 'unbound', ?, ?)
        "#,
    )
    .bind(dataset_id)
    .bind(row_id)
    .bind(&submitter.user_id)
    .bind(&submitter.first_name)
    .bind(&submitter.last_name)
    .bind(row_id.is_some())
    .bind(meta.consent.publish)
    .bind(meta.consent.contact)
    .bind(encode_list(&meta.community_tags)?)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(request_id)
}

pub async fn insert_detail(
    conn: &mut SqliteConnection,
    request_id: i64,
    dataset_id: i64,
    row_id: Option<i64>,
    change: &FieldChange,
    created_at: &DateTime<Utc>,
) -> StoreResult<i64> {
    let detail_id = sqlx::query(
        r#"
        INSERT INTO edit_request_details (
            request_id, dataset_id, row_id, field_name, old_value, new_value, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(request_id)
    .bind(dataset_id)
    .bind(row_id)
    .bind(&change.field_name)
    .bind(&change.old_value)
    .bind(&change.new_value)
    .bind(time::to_db(created_at))
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(detail_id)
}

pub async fn load_request(conn: &mut SqliteConnection, request_id: i64) -> StoreResult<Option<EditRequest>> {
    let row = sqlx::query(&format!("SELECT {} FROM edit_requests WHERE id = ?", REQUEST_COLUMNS))
        .bind(request_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(map_request).transpose()
}

/// Details of one request, by detail id
pub async fn load_details(conn: &mut SqliteConnection, request_id: i64) -> StoreResult<Vec<EditRequestDetail>> {
    let rows = sqlx::query(
        r#"
        SELECT id, request_id, dataset_id, row_id, field_name, old_value, new_value, created_at
        FROM edit_request_details WHERE request_id = ? ORDER BY id
        "#,
    )
    .bind(request_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_detail).collect()
}

/// Details of every reviewable request on a dataset, by detail id
pub async fn load_dataset_details(
    conn: &mut SqliteConnection,
    dataset_id: i64,
) -> StoreResult<Vec<(EditRequestDetail, RequestStatus)>> {
    let rows = sqlx::query(
        r#"
        SELECT d.id, d.request_id, d.dataset_id, d.row_id, d.field_name, d.old_value,
               d.new_value, d.created_at, r.status
        FROM edit_request_details d
        JOIN edit_requests r ON r.id = d.request_id
        WHERE d.dataset_id = ? AND r.status != 'submitting'
        ORDER BY d.id
        "#,
    )
    .bind(dataset_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_detail_with_status).collect()
}

/// Requests matching any of `statuses`, optionally one submitter, by id
pub async fn list_requests(
    conn: &mut SqliteConnection,
    statuses: &[RequestStatus],
    submitter_id: Option<&str>,
) -> StoreResult<Vec<EditRequest>> {
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM edit_requests WHERE status IN (", REQUEST_COLUMNS));
    let mut separated = query.separated(", ");
    for status in statuses {
        separated.push_bind(status.as_str());
    }
    separated.push_unseparated(")");

    if let Some(submitter_id) = submitter_id {
        query.push(" AND submitter_id = ").push_bind(submitter_id);
    }
    query.push(" ORDER BY id");

    let rows = query.build().fetch_all(&mut *conn).await?;
    rows.iter().map(map_request).collect()
}

/// Promote a fully staged request from `submitting` to `pending`
pub async fn mark_submitted(conn: &mut SqliteConnection, request_id: i64) -> StoreResult<bool> {
    let affected = sqlx::query(
        "UPDATE edit_requests SET status = 'pending', updated_at = ? WHERE id = ? AND status = 'submitting'",
    )
    .bind(time::to_db(&time::now()))
    .bind(request_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(affected > 0)
}

/// Remove a request; details and attachments cascade
pub async fn delete_request(conn: &mut SqliteConnection, request_id: i64) -> StoreResult<()> {
    sqlx::query("DELETE FROM edit_requests WHERE id = ?")
        .bind(request_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Claim a pending, unbound request for approval
///
/// Always the first statement of an approval transaction. Returns false if
/// the request is missing, already decided, or mid-approval.
pub async fn claim_pending(conn: &mut SqliteConnection, request_id: i64) -> StoreResult<bool> {
    let affected = sqlx::query(
        r#"
        UPDATE edit_requests SET updated_at = ?
        WHERE id = ? AND status = 'pending' AND binding_state = 'unbound'
        "#,
    )
    .bind(time::to_db(&time::now()))
    .bind(request_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(affected > 0)
}

/// Replace one detail's `new_value`; false if the detail is not on this request
pub async fn override_detail(
    conn: &mut SqliteConnection,
    request_id: i64,
    detail_id: i64,
    new_value: &str,
) -> StoreResult<bool> {
    let affected = sqlx::query("UPDATE edit_request_details SET new_value = ? WHERE id = ? AND request_id = ?")
        .bind(new_value)
        .bind(detail_id)
        .bind(request_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

/// Back-fill a minted row id onto a request and all of its details
pub async fn bind_row(
    conn: &mut SqliteConnection,
    request_id: i64,
    row_id: i64,
    relocation_prefix: &str,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE edit_requests
        SET row_id = ?, binding_state = 'bound', relocation_prefix = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(row_id)
    .bind(relocation_prefix)
    .bind(time::to_db(&time::now()))
    .bind(request_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE edit_request_details SET row_id = ? WHERE request_id = ?")
        .bind(row_id)
        .bind(request_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Undo [`bind_row`]; only touches requests that are still bound
pub async fn unbind_row(conn: &mut SqliteConnection, request_id: i64) -> StoreResult<bool> {
    let affected = sqlx::query(
        r#"
        UPDATE edit_requests
        SET row_id = NULL, binding_state = 'unbound', relocation_prefix = NULL, updated_at = ?
        WHERE id = ? AND binding_state = 'bound'
        "#,
    )
    .bind(time::to_db(&time::now()))
    .bind(request_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if affected == 0 {
        return Ok(false);
    }

    sqlx::query("UPDATE edit_request_details SET row_id = NULL WHERE request_id = ?")
        .bind(request_id)
        .execute(&mut *conn)
        .await?;

    Ok(true)
}

/// Pending → approved, clearing any binding marker
pub async fn mark_approved(
    conn: &mut SqliteConnection,
    request_id: i64,
    approver_id: &str,
    approved_at: &DateTime<Utc>,
) -> StoreResult<bool> {
    let now = time::to_db(approved_at);
    let affected = sqlx::query(
        r#"
        UPDATE edit_requests
        SET status = 'approved', approved_by = ?, approved_at = ?,
            binding_state = 'unbound', relocation_prefix = NULL, updated_at = ?
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(approver_id)
    .bind(&now)
    .bind(&now)
    .bind(request_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(affected > 0)
}

/// Pending and unbound → rejected
pub async fn mark_rejected(
    conn: &mut SqliteConnection,
    request_id: i64,
    reviewer_id: &str,
    rejected_at: &DateTime<Utc>,
) -> StoreResult<bool> {
    let now = time::to_db(rejected_at);
    let affected = sqlx::query(
        r#"
        UPDATE edit_requests
        SET status = 'rejected', rejected_by = ?, rejected_at = ?, updated_at = ?
        WHERE id = ? AND status = 'pending' AND binding_state = 'unbound'
        "#,
    )
    .bind(reviewer_id)
    .bind(&now)
    .bind(&now)
    .bind(request_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(affected > 0)
}

/// Requests left mid-approval
pub async fn list_bound(conn: &mut SqliteConnection) -> StoreResult<Vec<EditRequest>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM edit_requests WHERE binding_state = 'bound' ORDER BY id",
        REQUEST_COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_request).collect()
}
