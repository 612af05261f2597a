//! Test Helper Utilities
//!
//! Shared fixtures for rowkeep-store integration tests: a hub over a
//! temporary database, fault-injecting object stores and audit sinks.

#![allow(dead_code)]

use async_trait::async_trait;
use rowkeep_common::db::init_database;
use rowkeep_store::config::MediaSettings;
use rowkeep_store::error::{StoreError, StoreResult};
use rowkeep_store::models::{Dataset, MediaUpload, Submitter, Visibility};
use rowkeep_store::parser::FileFormat;
use rowkeep_store::services::{AuditEntry, AuditSink, SqliteAuditSink, StaticRoleLookup};
use rowkeep_store::storage::{MemoryObjectStore, ObjectStore};
use rowkeep_store::Hub;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const BUCKET: &str = "edit-media";

pub const SHOPS_CSV: &str = "name,city,hours\nBlue Door,Leeds,9-5\nCorner Deli,York,8-6\nHarbour Books,Whitby,10-4\n";

/// Hub plus the handles tests poke at directly
///
/// `_dir` must outlive the pool.
pub struct TestHub {
    pub _dir: TempDir,
    pub hub: Hub,
    pub pool: SqlitePool,
    pub objects: Arc<FaultyObjectStore>,
}

/// Temporary database with the full schema
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("rowkeep.db")).await.unwrap();
    (dir, pool)
}

/// Hub over a healthy in-memory object store, admin "root", SQLite audit log
pub async fn create_test_hub() -> TestHub {
    create_hub_with(FaultyObjectStore::healthy(), None).await
}

pub async fn create_hub_with(objects: FaultyObjectStore, audit: Option<Arc<dyn AuditSink>>) -> TestHub {
    let (dir, pool) = create_test_db().await;
    let objects = Arc::new(objects);
    let audit: Arc<dyn AuditSink> = match audit {
        Some(audit) => audit,
        None => Arc::new(SqliteAuditSink::new(pool.clone())),
    };

    let hub = Hub::new(
        pool.clone(),
        objects.clone(),
        MediaSettings::default(),
        Arc::new(StaticRoleLookup::new(["root"])),
        audit,
    );
    TestHub { _dir: dir, hub, pool, objects }
}

pub async fn ingest_shops(hub: &Hub, name: &str) -> Dataset {
    hub.ingest_dataset(name, SHOPS_CSV.as_bytes(), FileFormat::Csv, Visibility::Private, "admin-1")
        .await
        .unwrap()
}

pub fn ada() -> Submitter {
    Submitter::new("u-ada", "Ada", "Lovelace")
}

pub fn grace() -> Submitter {
    Submitter::new("u-grace", "Grace", "Hopper")
}

pub fn jpeg(name: &str, bytes: &[u8]) -> MediaUpload {
    MediaUpload::photo(name, "image/jpeg", bytes.to_vec())
}

/// In-memory object store that can be armed to fail
///
/// A budget of `n >= 0` lets `n` operations of that kind succeed and fails
/// the next one, after which the store is healthy again. Negative budgets
/// never fail.
pub struct FaultyObjectStore {
    inner: MemoryObjectStore,
    put_budget: AtomicI64,
    copy_budget: AtomicI64,
    copies: AtomicI64,
}

impl FaultyObjectStore {
    pub fn healthy() -> Self {
        Self::new(-1, -1)
    }

    /// Fail the `(n + 1)`th put
    pub fn failing_put_after(n: i64) -> Self {
        Self::new(n, -1)
    }

    /// Fail the `(n + 1)`th copy
    pub fn failing_copy_after(n: i64) -> Self {
        Self::new(-1, n)
    }

    fn new(put_budget: i64, copy_budget: i64) -> Self {
        Self {
            inner: MemoryObjectStore::new(),
            put_budget: AtomicI64::new(put_budget),
            copy_budget: AtomicI64::new(copy_budget),
            copies: AtomicI64::new(0),
        }
    }

    pub fn arm_copy_failure(&self, n: i64) {
        self.copy_budget.store(n, Ordering::SeqCst);
    }

    /// Successful copies so far
    pub fn copies(&self) -> i64 {
        self.copies.load(Ordering::SeqCst)
    }

    /// Every key in the test bucket
    pub async fn keys(&self) -> Vec<String> {
        self.inner
            .keys()
            .await
            .into_iter()
            .filter(|(bucket, _)| bucket == BUCKET)
            .map(|(_, key)| key)
            .collect()
    }

    pub async fn keys_under(&self, prefix: &str) -> Vec<String> {
        self.keys().await.into_iter().filter(|k| k.starts_with(prefix)).collect()
    }

    /// Consume one unit of budget; true when this call must fail
    fn trips(budget: &AtomicI64) -> bool {
        let remaining = budget.load(Ordering::SeqCst);
        if remaining < 0 {
            return false;
        }
        if remaining == 0 {
            budget.store(-1, Ordering::SeqCst);
            return true;
        }
        budget.store(remaining - 1, Ordering::SeqCst);
        false
    }
}

#[async_trait]
impl ObjectStore for FaultyObjectStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> StoreResult<()> {
        if Self::trips(&self.put_budget) {
            return Err(StoreError::ObjectStore(format!("injected put failure for {}", key)));
        }
        self.inner.put(bucket, key, bytes, content_type).await
    }

    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        self.inner.get(bucket, key).await
    }

    async fn copy(&self, bucket: &str, from_key: &str, to_key: &str) -> StoreResult<()> {
        if Self::trips(&self.copy_budget) {
            return Err(StoreError::ObjectStore(format!("injected copy failure for {}", from_key)));
        }
        self.inner.copy(bucket, from_key, to_key).await?;
        self.copies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.inner.delete(bucket, key).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        self.inner.list(bucket, prefix).await
    }
}

/// Audit sink whose every write fails
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn log(&self, _entry: &AuditEntry) -> StoreResult<()> {
        Err(StoreError::Internal("audit backend unavailable".to_string()))
    }
}
