//! Media attachment rows

use super::{optional_timestamp, timestamp};
use crate::error::StoreResult;
use crate::models::{MediaAttachment, MediaKind, ModerationStatus};
use chrono::{DateTime, Utc};
use rowkeep_common::time;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

const ATTACHMENT_COLUMNS: &str = "id, request_id, row_id, bucket, locator, original_filename, \
     content_type, byte_size, kind, category, moderation_status, moderated_by, moderated_at, created_at";

fn map_attachment(row: &SqliteRow) -> StoreResult<MediaAttachment> {
    let kind: String = row.try_get("kind")?;
    let moderation: String = row.try_get("moderation_status")?;

    Ok(MediaAttachment {
        id: row.try_get("id")?,
        request_id: row.try_get("request_id")?,
        row_id: row.try_get("row_id")?,
        bucket: row.try_get("bucket")?,
        locator: row.try_get("locator")?,
        original_filename: row.try_get("original_filename")?,
        content_type: row.try_get("content_type")?,
        byte_size: row.try_get("byte_size")?,
        kind: MediaKind::from_db(&kind)?,
        category: row.try_get("category")?,
        moderation_status: ModerationStatus::from_db(&moderation)?,
        moderated_by: row.try_get("moderated_by")?,
        moderated_at: optional_timestamp(row, "moderated_at")?,
        created_at: timestamp(row, "created_at")?,
    })
}

/// Attachment row for an object that has already been staged
pub struct NewAttachment<'a> {
    pub request_id: i64,
    pub row_id: Option<i64>,
    pub bucket: &'a str,
    pub locator: &'a str,
    pub original_filename: &'a str,
    pub content_type: Option<&'a str>,
    pub byte_size: i64,
    pub kind: MediaKind,
    pub category: &'a str,
}

pub async fn insert_attachment(
    conn: &mut SqliteConnection,
    new: &NewAttachment<'_>,
    created_at: &DateTime<Utc>,
) -> StoreResult<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO media_attachments (
            request_id, row_id, bucket, locator, original_filename, content_type,
            byte_size, kind, category, moderation_status, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(new.request_id)
    .bind(new.row_id)
    .bind(new.bucket)
    .bind(new.locator)
    .bind(new.original_filename)
    .bind(new.content_type)
    .bind(new.byte_size)
    .bind(new.kind.as_str())
    .bind(new.category)
    .bind(time::to_db(created_at))
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(id)
}

/// Attachments of one request, by id
pub async fn list_for_request(conn: &mut SqliteConnection, request_id: i64) -> StoreResult<Vec<MediaAttachment>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM media_attachments WHERE request_id = ? ORDER BY id",
        ATTACHMENT_COLUMNS
    ))
    .bind(request_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_attachment).collect()
}

pub async fn load_attachment(conn: &mut SqliteConnection, id: i64) -> StoreResult<Option<MediaAttachment>> {
    let row = sqlx::query(&format!("SELECT {} FROM media_attachments WHERE id = ?", ATTACHMENT_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(map_attachment).transpose()
}

/// Point an attachment at its relocated object and permanent row
pub async fn set_location(conn: &mut SqliteConnection, id: i64, row_id: i64, locator: &str) -> StoreResult<()> {
    sqlx::query("UPDATE media_attachments SET row_id = ?, locator = ? WHERE id = ?")
        .bind(row_id)
        .bind(locator)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Record a moderation decision on every attachment in `ids`
pub async fn set_moderation(
    conn: &mut SqliteConnection,
    ids: &[i64],
    status: ModerationStatus,
    moderator: &str,
    moderated_at: &DateTime<Utc>,
) -> StoreResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE media_attachments SET moderation_status = ");
    query
        .push_bind(status.as_str())
        .push(", moderated_by = ")
        .push_bind(moderator)
        .push(", moderated_at = ")
        .push_bind(time::to_db(moderated_at))
        .push(" WHERE id IN (");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let affected = query.build().execute(&mut *conn).await?.rows_affected();
    Ok(affected)
}
