//! Data rows of a (dataset, version)

use crate::error::StoreResult;
use crate::models::RowFields;
use rowkeep_common::time;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

/// Stored row before its field map is decoded
#[derive(Debug, Clone)]
pub struct RawRow {
    pub id: i64,
    pub dataset_id: i64,
    pub version: i64,
    pub seq: i64,
    pub data: String,
}

fn map_raw_row(row: &SqliteRow) -> StoreResult<RawRow> {
    Ok(RawRow {
        id: row.try_get("id")?,
        dataset_id: row.try_get("dataset_id")?,
        version: row.try_get("version")?,
        seq: row.try_get("seq")?,
        data: row.try_get("data")?,
    })
}

/// Insert a full row set with sequence numbers 1..=n
pub async fn insert_rows(
    conn: &mut SqliteConnection,
    dataset_id: i64,
    version: i64,
    rows: &[RowFields],
) -> StoreResult<()> {
    let now = time::to_db(&time::now());
    for (idx, fields) in rows.iter().enumerate() {
        sqlx::query(
            "INSERT INTO data_rows (dataset_id, version, seq, data, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(dataset_id)
        .bind(version)
        .bind(idx as i64 + 1)
        .bind(fields.to_json()?)
        .bind(&now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Append one row after the last sequence number of a version
pub async fn append_row(
    conn: &mut SqliteConnection,
    dataset_id: i64,
    version: i64,
    fields: &RowFields,
) -> StoreResult<i64> {
    let row_id = sqlx::query(
        r#"
        INSERT INTO data_rows (dataset_id, version, seq, data, created_at)
        SELECT ?, ?, COALESCE(MAX(seq), 0) + 1, ?, ?
        FROM data_rows WHERE dataset_id = ? AND version = ?
        "#,
    )
    .bind(dataset_id)
    .bind(version)
    .bind(fields.to_json()?)
    .bind(time::to_db(&time::now()))
    .bind(dataset_id)
    .bind(version)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(row_id)
}

/// Rows minted for a new-row approval that has not finished yet
const UNSETTLED_ROWS: &str = "SELECT row_id FROM edit_requests \
     WHERE dataset_id = ? AND binding_state = 'bound' AND row_id IS NOT NULL";

/// Clone every settled row of one version into another, keeping order and content
pub async fn copy_version_rows(
    conn: &mut SqliteConnection,
    dataset_id: i64,
    from_version: i64,
    to_version: i64,
) -> StoreResult<u64> {
    let copied = sqlx::query(&format!(
        r#"
        INSERT INTO data_rows (dataset_id, version, seq, data, created_at)
        SELECT dataset_id, ?, seq, data, ?
        FROM data_rows
        WHERE dataset_id = ? AND version = ? AND id NOT IN ({})
        ORDER BY seq, id
        "#,
        UNSETTLED_ROWS
    ))
    .bind(to_version)
    .bind(time::to_db(&time::now()))
    .bind(dataset_id)
    .bind(from_version)
    .bind(dataset_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(copied)
}

/// Settled rows of one version in insertion order
///
/// A row minted by an approval still moving its media stays hidden until the
/// approval finishes, so readers never see a row that may be rolled back.
pub async fn load_version_rows(
    conn: &mut SqliteConnection,
    dataset_id: i64,
    version: i64,
) -> StoreResult<Vec<RawRow>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT id, dataset_id, version, seq, data FROM data_rows
        WHERE dataset_id = ? AND version = ? AND id NOT IN ({})
        ORDER BY seq, id
        "#,
        UNSETTLED_ROWS
    ))
    .bind(dataset_id)
    .bind(version)
    .bind(dataset_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(map_raw_row).collect()
}

/// One row by id within a dataset
pub async fn load_row(conn: &mut SqliteConnection, dataset_id: i64, row_id: i64) -> StoreResult<Option<RawRow>> {
    let row = sqlx::query(
        "SELECT id, dataset_id, version, seq, data FROM data_rows WHERE id = ? AND dataset_id = ?",
    )
    .bind(row_id)
    .bind(dataset_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(map_raw_row).transpose()
}

pub async fn update_row_data(conn: &mut SqliteConnection, row_id: i64, fields: &RowFields) -> StoreResult<()> {
    sqlx::query("UPDATE data_rows SET data = ? WHERE id = ?")
        .bind(fields.to_json()?)
        .bind(row_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Delete one row; returns false if it did not exist
pub async fn delete_row(conn: &mut SqliteConnection, row_id: i64) -> StoreResult<bool> {
    let affected = sqlx::query("DELETE FROM data_rows WHERE id = ?")
        .bind(row_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(affected > 0)
}
