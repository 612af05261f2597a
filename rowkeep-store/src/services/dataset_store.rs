//! Versioned dataset store
//!
//! Each ingest, replace or revert writes one immutable snapshot plus a full
//! row set. Version numbers come from an atomic increment of
//! `datasets.current_version` issued as the first statement of the
//! transaction, so concurrent writers serialize on the SQLite write lock and
//! numbering never goes backward or collides.

use crate::db::{datasets, rows, versions};
use crate::error::{StoreError, StoreResult};
use crate::models::{DataRow, Dataset, DatasetVersion, RowFields, SourceInfo, Visibility};
use crate::parser::ParsedTable;
use rowkeep_common::time;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, info};

/// Owns the canonical sequence of dataset versions
#[derive(Debug, Clone)]
pub struct VersionedStore {
    db: SqlitePool,
}

fn build_rows(table: &ParsedTable) -> Vec<RowFields> {
    table
        .rows
        .iter()
        .map(|cells| RowFields::from_columns(&table.columns, cells))
        .collect()
}

impl VersionedStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Create a dataset at version 1
    ///
    /// # Returns
    /// * `Err(StoreError::DuplicateName)` - a live dataset already has this name
    pub async fn ingest(
        &self,
        name: &str,
        table: &ParsedTable,
        visibility: Visibility,
        source: &SourceInfo,
        actor: &str,
    ) -> StoreResult<Dataset> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("Dataset name is empty".to_string()));
        }

        let now = time::now();
        let row_count = table.rows.len() as i64;
        let mut tx = self.db.begin().await?;

        let dataset_id = datasets::insert_dataset(
            &mut tx,
            &datasets::NewDataset {
                name,
                visibility,
                column_order: &table.columns,
                row_count,
                byte_size: source.byte_size,
                created_by: actor,
                created_at: now,
            },
        )
        .await?;

        versions::insert_version(
            &mut tx,
            &DatasetVersion {
                dataset_id,
                version: 1,
                row_count,
                byte_size: source.byte_size,
                visibility,
                column_order: table.columns.clone(),
                content_sha256: source.content_sha256.clone(),
                reverted_from: None,
                created_by: actor.to_string(),
                created_at: now,
            },
        )
        .await?;

        rows::insert_rows(&mut tx, dataset_id, 1, &build_rows(table)).await?;
        let dataset = datasets::require_dataset(&mut tx, dataset_id).await?;
        tx.commit().await?;

        info!(dataset_id, name, rows = row_count, columns = table.columns.len(), "Dataset ingested");
        Ok(dataset)
    }

    /// Write a new version wholesale
    pub async fn replace(
        &self,
        dataset_id: i64,
        table: &ParsedTable,
        source: &SourceInfo,
        actor: &str,
    ) -> StoreResult<Dataset> {
        let now = time::now();
        let row_count = table.rows.len() as i64;
        let mut tx = self.db.begin().await?;

        let version = datasets::advance_version(&mut tx, dataset_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Dataset {}", dataset_id)))?;
        let current = datasets::require_dataset(&mut tx, dataset_id).await?;

        versions::insert_version(
            &mut tx,
            &DatasetVersion {
                dataset_id,
                version,
                row_count,
                byte_size: source.byte_size,
                visibility: current.visibility,
                column_order: table.columns.clone(),
                content_sha256: source.content_sha256.clone(),
                reverted_from: None,
                created_by: actor.to_string(),
                created_at: now,
            },
        )
        .await?;

        rows::insert_rows(&mut tx, dataset_id, version, &build_rows(table)).await?;
        datasets::set_current(
            &mut tx,
            dataset_id,
            row_count,
            source.byte_size,
            current.visibility,
            &table.columns,
            &now,
        )
        .await?;

        let dataset = datasets::require_dataset(&mut tx, dataset_id).await?;
        tx.commit().await?;

        info!(dataset_id, version, rows = row_count, "Dataset replaced");
        Ok(dataset)
    }

    /// Clone an old version forward as the next version
    ///
    /// Additive: the target snapshot and its rows are never touched.
    pub async fn revert(&self, dataset_id: i64, target_version: i64, actor: &str) -> StoreResult<Dataset> {
        let now = time::now();
        let mut tx = self.db.begin().await?;

        let version = datasets::advance_version(&mut tx, dataset_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Dataset {}", dataset_id)))?;

        // Dropping the transaction on this error undoes the increment
        let target = versions::load_version(&mut tx, dataset_id, target_version)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound(format!("Dataset {} version {}", dataset_id, target_version))
            })?;

        let copied = rows::copy_version_rows(&mut tx, dataset_id, target_version, version).await?;
        debug!(dataset_id, from = target_version, to = version, copied, "Copied rows for revert");
        let row_count = copied as i64;

        versions::insert_version(
            &mut tx,
            &DatasetVersion {
                dataset_id,
                version,
                row_count,
                byte_size: target.byte_size,
                visibility: target.visibility,
                column_order: target.column_order.clone(),
                content_sha256: None,
                reverted_from: Some(target_version),
                created_by: actor.to_string(),
                created_at: now,
            },
        )
        .await?;

        datasets::set_current(
            &mut tx,
            dataset_id,
            row_count,
            target.byte_size,
            target.visibility,
            &target.column_order,
            &now,
        )
        .await?;

        let dataset = datasets::require_dataset(&mut tx, dataset_id).await?;
        tx.commit().await?;

        info!(dataset_id, version, reverted_from = target_version, "Dataset reverted");
        Ok(dataset)
    }

    /// Rows of one version in insertion order, projected onto its column order
    pub async fn read(&self, dataset_id: i64, version: i64) -> StoreResult<Vec<DataRow>> {
        let mut conn = self.db.acquire().await?;
        datasets::require_dataset(&mut conn, dataset_id).await?;
        let snapshot = versions::load_version(&mut conn, dataset_id, version)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Dataset {} version {}", dataset_id, version)))?;

        let raw_rows = rows::load_version_rows(&mut conn, dataset_id, version).await?;
        let mut result = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            let fields = RowFields::from_json(&raw.data).map_err(|e| {
                error!(dataset_id, version, row_id = raw.id, error = %e, "Stored row could not be decoded");
                e
            })?;
            result.push(DataRow {
                id: raw.id,
                dataset_id: raw.dataset_id,
                version: raw.version,
                fields: fields.project(&snapshot.column_order),
            });
        }

        Ok(result)
    }

    pub async fn get(&self, dataset_id: i64) -> StoreResult<Dataset> {
        let mut conn = self.db.acquire().await?;
        datasets::require_dataset(&mut conn, dataset_id).await
    }

    pub async fn list_versions(&self, dataset_id: i64) -> StoreResult<Vec<DatasetVersion>> {
        let mut conn = self.db.acquire().await?;
        datasets::require_dataset(&mut conn, dataset_id).await?;
        versions::list_versions(&mut conn, dataset_id).await
    }

    /// Datasets a reader may see: everything for admins, otherwise public
    /// datasets plus explicit grants
    pub async fn list_datasets(&self, reader_id: &str, is_admin: bool) -> StoreResult<Vec<Dataset>> {
        let mut conn = self.db.acquire().await?;
        if is_admin {
            datasets::list_all(&mut conn).await
        } else {
            datasets::list_visible_to(&mut conn, reader_id).await
        }
    }

    pub async fn grant_access(&self, dataset_id: i64, user_id: &str) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        datasets::require_dataset(&mut tx, dataset_id).await?;
        if datasets::insert_grant(&mut tx, dataset_id, user_id).await? {
            info!(dataset_id, user_id, "Dataset access granted");
        }
        tx.commit().await?;
        Ok(())
    }

    /// Hide a dataset from every operation; its name becomes reusable
    pub async fn soft_delete(&self, dataset_id: i64) -> StoreResult<()> {
        let mut conn = self.db.acquire().await?;
        if !datasets::soft_delete(&mut conn, dataset_id).await? {
            return Err(StoreError::NotFound(format!("Dataset {}", dataset_id)));
        }
        info!(dataset_id, "Dataset deleted");
        Ok(())
    }
}

// Row-level primitives for callers that already hold a transaction

/// Append a row to the dataset's current version and bump the row counts of
/// the dataset and of that version's snapshot
pub async fn insert_row(conn: &mut SqliteConnection, dataset_id: i64, fields: &RowFields) -> StoreResult<i64> {
    let dataset = datasets::require_dataset(conn, dataset_id).await?;
    let row_id = rows::append_row(conn, dataset_id, dataset.current_version, fields).await?;
    datasets::adjust_row_count(conn, dataset_id, 1).await?;
    versions::adjust_row_count(conn, dataset_id, dataset.current_version, 1).await?;
    debug!(dataset_id, version = dataset.current_version, row_id, "Row appended");
    Ok(row_id)
}

/// Decode one stored row
///
/// # Returns
/// * `Err(StoreError::RowNotFound)` - no such row in this dataset
/// * `Err(StoreError::Unmarshal)` - the stored field map is corrupt
pub async fn load_row(conn: &mut SqliteConnection, dataset_id: i64, row_id: i64) -> StoreResult<RowFields> {
    let raw = rows::load_row(conn, dataset_id, row_id)
        .await?
        .ok_or(StoreError::RowNotFound { dataset_id, row_id })?;
    RowFields::from_json(&raw.data)
}

pub async fn update_row_fields(conn: &mut SqliteConnection, row_id: i64, fields: &RowFields) -> StoreResult<()> {
    rows::update_row_data(conn, row_id, fields).await
}

/// Remove a row minted by [`insert_row`] and restore the row counts
///
/// The dataset count only moves back while the row's version is still current.
pub async fn remove_inserted_row(conn: &mut SqliteConnection, dataset_id: i64, row_id: i64) -> StoreResult<()> {
    let Some(raw) = rows::load_row(conn, dataset_id, row_id).await? else {
        return Ok(());
    };
    if !rows::delete_row(conn, row_id).await? {
        return Ok(());
    }

    versions::adjust_row_count(conn, dataset_id, raw.version, -1).await?;
    let current = datasets::load_dataset(conn, dataset_id).await?;
    if current.is_some_and(|d| d.current_version == raw.version) {
        datasets::adjust_row_count(conn, dataset_id, -1).await?;
    }
    Ok(())
}
