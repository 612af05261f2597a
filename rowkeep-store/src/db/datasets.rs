//! Dataset header rows and access grants

use super::{encode_list, string_list, timestamp};
use crate::error::{StoreError, StoreResult};
use crate::models::{Dataset, Visibility};
use chrono::{DateTime, Utc};
use rowkeep_common::time;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

const DATASET_COLUMNS: &str = "id, name, current_version, row_count, byte_size, visibility, \
     column_order, deleted, created_by, created_at, updated_at";

fn map_dataset(row: &SqliteRow) -> StoreResult<Dataset> {
    let visibility: String = row.try_get("visibility")?;
    let visibility = visibility
        .parse::<Visibility>()
        .map_err(|_| StoreError::Unmarshal(format!("Unknown stored visibility '{}'", visibility)))?;

    Ok(Dataset {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        current_version: row.try_get("current_version")?,
        row_count: row.try_get("row_count")?,
        byte_size: row.try_get("byte_size")?,
        visibility,
        column_order: string_list(row, "column_order")?,
        deleted: row.try_get("deleted")?,
        created_by: row.try_get("created_by")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

/// New dataset header at version 1
pub struct NewDataset<'a> {
    pub name: &'a str,
    pub visibility: Visibility,
    pub column_order: &'a [String],
    pub row_count: i64,
    pub byte_size: i64,
    pub created_by: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Insert a dataset header
///
/// A live dataset with the same name maps to `DuplicateName`.
pub async fn insert_dataset(conn: &mut SqliteConnection, new: &NewDataset<'_>) -> StoreResult<i64> {
    let now = time::to_db(&new.created_at);
    let result = sqlx::query(
        r#"
        INSERT INTO datasets (
            name, current_version, row_count, byte_size, visibility,
            column_order, deleted, created_by, created_at, updated_at
        )
        VALUES (?, 1, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(new.name)
    .bind(new.row_count)
    .bind(new.byte_size)
    .bind(new.visibility.as_str())
    .bind(encode_list(new.column_order)?)
    .bind(new.created_by)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(StoreError::DuplicateName(new.name.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Load a live (not soft-deleted) dataset
pub async fn load_dataset(conn: &mut SqliteConnection, dataset_id: i64) -> StoreResult<Option<Dataset>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM datasets WHERE id = ? AND deleted = 0",
        DATASET_COLUMNS
    ))
    .bind(dataset_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(map_dataset).transpose()
}

/// Load a live dataset or fail with `NotFound`
pub async fn require_dataset(conn: &mut SqliteConnection, dataset_id: i64) -> StoreResult<Dataset> {
    load_dataset(conn, dataset_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Dataset {}", dataset_id)))
}

/// Atomically advance `current_version` and return the new number
///
/// Must be the first statement of its transaction: the write takes the
/// database write lock, so concurrent writers serialize here.
pub async fn advance_version(conn: &mut SqliteConnection, dataset_id: i64) -> StoreResult<Option<i64>> {
    let version: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE datasets SET current_version = current_version + 1
        WHERE id = ? AND deleted = 0
        RETURNING current_version
        "#,
    )
    .bind(dataset_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(version)
}

/// Point the dataset's current fields at a freshly written version
pub async fn set_current(
    conn: &mut SqliteConnection,
    dataset_id: i64,
    row_count: i64,
    byte_size: i64,
    visibility: Visibility,
    column_order: &[String],
    updated_at: &DateTime<Utc>,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE datasets
        SET row_count = ?, byte_size = ?, visibility = ?, column_order = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(row_count)
    .bind(byte_size)
    .bind(visibility.as_str())
    .bind(encode_list(column_order)?)
    .bind(time::to_db(updated_at))
    .bind(dataset_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Add `delta` to the current row count
pub async fn adjust_row_count(conn: &mut SqliteConnection, dataset_id: i64, delta: i64) -> StoreResult<()> {
    sqlx::query("UPDATE datasets SET row_count = MAX(row_count + ?, 0), updated_at = ? WHERE id = ?")
        .bind(delta)
        .bind(time::to_db(&time::now()))
        .bind(dataset_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Soft-delete a dataset; returns false when it was already gone
pub async fn soft_delete(conn: &mut SqliteConnection, dataset_id: i64) -> StoreResult<bool> {
    let affected = sqlx::query("UPDATE datasets SET deleted = 1, updated_at = ? WHERE id = ? AND deleted = 0")
        .bind(time::to_db(&time::now()))
        .bind(dataset_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(affected > 0)
}

/// Every live dataset, by id
pub async fn list_all(conn: &mut SqliteConnection) -> StoreResult<Vec<Dataset>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM datasets WHERE deleted = 0 ORDER BY id",
        DATASET_COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_dataset).collect()
}

/// Live datasets that are public or explicitly granted to `user_id`
pub async fn list_visible_to(conn: &mut SqliteConnection, user_id: &str) -> StoreResult<Vec<Dataset>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM datasets
        WHERE deleted = 0
          AND (visibility = 'public'
               OR id IN (SELECT dataset_id FROM dataset_grants WHERE user_id = ?))
        ORDER BY id
        "#,
        DATASET_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_dataset).collect()
}

/// Grant read access to a private dataset; repeated grants are no-ops
pub async fn insert_grant(conn: &mut SqliteConnection, dataset_id: i64, user_id: &str) -> StoreResult<bool> {
    let affected = sqlx::query(
        "INSERT OR IGNORE INTO dataset_grants (dataset_id, user_id, granted_at) VALUES (?, ?, ?)",
    )
    .bind(dataset_id)
    .bind(user_id)
    .bind(time::to_db(&time::now()))
    .execute(&mut *conn)
    .await?
    .rows_affected();
    Ok(affected > 0)
}
