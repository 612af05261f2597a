//! Best-effort audit trail
//!
//! Audit writes never decide the outcome of an operation: [`record`] logs a
//! failing sink at warn level and carries on.

use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rowkeep_common::time;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

/// One audited action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: String,
    /// Verb, e.g. `dataset.ingest` or `edit_request.approve`
    pub action: String,
    /// Affected object, e.g. `dataset:4`
    pub target: String,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(actor: &str, action: &str, target: impl Into<String>) -> Self {
        Self {
            actor: actor.to_string(),
            action: action.to_string(),
            target: target.into(),
            detail: None,
            at: time::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Audit log collaborator
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(&self, entry: &AuditEntry) -> StoreResult<()>;
}

/// Write an entry, swallowing sink failures
pub async fn record(sink: &dyn AuditSink, entry: AuditEntry) {
    if let Err(e) = sink.log(&entry).await {
        warn!(
            action = %entry.action,
            target = %entry.target,
            error = %e,
            "Audit log write failed"
        );
    }
}

/// Emits audit entries as tracing events
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log(&self, entry: &AuditEntry) -> StoreResult<()> {
        info!(
            target: "rowkeep::audit",
            actor = %entry.actor,
            action = %entry.action,
            object = %entry.target,
            detail = entry.detail.as_deref().unwrap_or(""),
            "audit"
        );
        Ok(())
    }
}

/// Persists audit entries to the `audit_log` table
#[derive(Debug, Clone)]
pub struct SqliteAuditSink {
    db: SqlitePool,
}

impl SqliteAuditSink {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Most recent entries first
    pub async fn recent(&self, limit: i64) -> StoreResult<Vec<AuditEntry>> {
        let mut conn = self.db.acquire().await?;
        crate::db::audit::recent_entries(&mut conn, limit).await
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn log(&self, entry: &AuditEntry) -> StoreResult<()> {
        let mut conn = self.db.acquire().await?;
        crate::db::audit::insert_entry(&mut conn, entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn log(&self, _entry: &AuditEntry) -> StoreResult<()> {
            Err(StoreError::ObjectStore("audit backend offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_record_swallows_sink_failure() {
        record(&BrokenSink, AuditEntry::new("u1", "dataset.ingest", "dataset:1")).await;
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_entries() {
        let entry = AuditEntry::new("u1", "dataset.revert", "dataset:2").with_detail("to version 1");
        assert!(TracingAuditSink.log(&entry).await.is_ok());
    }
}
