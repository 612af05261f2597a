//! Immutable version snapshots

use super::{encode_list, string_list, timestamp};
use crate::error::{StoreError, StoreResult};
use crate::models::{DatasetVersion, Visibility};
use rowkeep_common::time;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

const VERSION_COLUMNS: &str = "dataset_id, version, row_count, byte_size, visibility, column_order, \
     content_sha256, reverted_from, created_by, created_at";

fn map_version(row: &SqliteRow) -> StoreResult<DatasetVersion> {
    let visibility: String = row.try_get("visibility")?;
    let visibility = visibility
        .parse::<Visibility>()
        .map_err(|_| StoreError::Unmarshal(format!("Unknown stored visibility '{}'", visibility)))?;

    Ok(DatasetVersion {
        dataset_id: row.try_get("dataset_id")?,
        version: row.try_get("version")?,
        row_count: row.try_get("row_count")?,
        byte_size: row.try_get("byte_size")?,
        visibility,
        column_order: string_list(row, "column_order")?,
        content_sha256: row.try_get("content_sha256")?,
        reverted_from: row.try_get("reverted_from")?,
        created_by: row.try_get("created_by")?,
        created_at: timestamp(row, "created_at")?,
    })
}

/// Record a snapshot; `(dataset_id, version)` is unique
pub async fn insert_version(conn: &mut SqliteConnection, version: &DatasetVersion) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO dataset_versions (
            dataset_id, version, row_count, byte_size, visibility, column_order,
            content_sha256, reverted_from, created_by, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(version.dataset_id)
    .bind(version.version)
    .bind(version.row_count)
    .bind(version.byte_size)
    .bind(version.visibility.as_str())
    .bind(encode_list(&version.column_order)?)
    .bind(&version.content_sha256)
    .bind(version.reverted_from)
    .bind(&version.created_by)
    .bind(time::to_db(&version.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn load_version(
    conn: &mut SqliteConnection,
    dataset_id: i64,
    version: i64,
) -> StoreResult<Option<DatasetVersion>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM dataset_versions WHERE dataset_id = ? AND version = ?",
        VERSION_COLUMNS
    ))
    .bind(dataset_id)
    .bind(version)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(map_version).transpose()
}

/// Every snapshot of a dataset, oldest first
pub async fn list_versions(conn: &mut SqliteConnection, dataset_id: i64) -> StoreResult<Vec<DatasetVersion>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM dataset_versions WHERE dataset_id = ? ORDER BY version",
        VERSION_COLUMNS
    ))
    .bind(dataset_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_version).collect()
}

/// Add `delta` to one snapshot's row count after a row-level change
pub async fn adjust_row_count(
    conn: &mut SqliteConnection,
    dataset_id: i64,
    version: i64,
    delta: i64,
) -> StoreResult<()> {
    sqlx::query(
        "UPDATE dataset_versions SET row_count = MAX(row_count + ?, 0) WHERE dataset_id = ? AND version = ?",
    )
    .bind(delta)
    .bind(dataset_id)
    .bind(version)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
