//! Row-store queries
//!
//! Every function takes a plain `&mut SqliteConnection` so it can run against
//! a pooled connection or inside a transaction (`&mut tx`).

pub mod audit;
pub mod datasets;
pub mod edit_requests;
pub mod media;
pub mod rows;
pub mod versions;

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use rowkeep_common::time;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Read a non-null timestamp column
pub(crate) fn timestamp(row: &SqliteRow, column: &str) -> StoreResult<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    Ok(time::from_db(&raw)?)
}

/// Read a nullable timestamp column
pub(crate) fn optional_timestamp(row: &SqliteRow, column: &str) -> StoreResult<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| time::from_db(&value).map_err(StoreError::from))
        .transpose()
}

/// Decode a JSON string-list column
pub(crate) fn string_list(row: &SqliteRow, column: &str) -> StoreResult<Vec<String>> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw)
        .map_err(|e| StoreError::Unmarshal(format!("Column '{}' is not a string list: {}", column, e)))
}

/// Encode a string list for a JSON column
pub(crate) fn encode_list(values: &[String]) -> StoreResult<String> {
    serde_json::to_string(values).map_err(|e| StoreError::Unmarshal(e.to_string()))
}
