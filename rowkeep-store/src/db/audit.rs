//! Audit log rows

use crate::error::StoreResult;
use crate::services::audit::AuditEntry;
use rowkeep_common::time;
use sqlx::{Row, SqliteConnection};

pub async fn insert_entry(conn: &mut SqliteConnection, entry: &AuditEntry) -> StoreResult<()> {
    sqlx::query("INSERT INTO audit_log (actor, action, target, detail, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(&entry.target)
        .bind(&entry.detail)
        .bind(time::to_db(&entry.at))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Most recent entries first
pub async fn recent_entries(conn: &mut SqliteConnection, limit: i64) -> StoreResult<Vec<AuditEntry>> {
    let rows = sqlx::query(
        "SELECT actor, action, target, detail, created_at FROM audit_log ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        entries.push(AuditEntry {
            actor: row.try_get("actor")?,
            action: row.try_get("action")?,
            target: row.try_get("target")?,
            detail: row.try_get("detail")?,
            at: super::timestamp(&row, "created_at")?,
        });
    }
    Ok(entries)
}
