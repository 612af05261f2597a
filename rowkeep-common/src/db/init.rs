//! Database initialization
//!
//! Opens (or creates) the SQLite database, creates every table with
//! `CREATE TABLE IF NOT EXISTS`, runs the versioned migrations and ensures
//! default settings exist. Safe to call on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Busy timeout used until the `db_busy_timeout_ms` setting has been read
const BOOTSTRAP_BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let bootstrap = open_pool(db_path, BOOTSTRAP_BUSY_TIMEOUT_MS).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&bootstrap).await?;

    let timeout_ms: i64 = sqlx::query_scalar(
        "SELECT CAST(value AS INTEGER) FROM settings WHERE key = 'db_busy_timeout_ms'",
    )
    .fetch_optional(&bootstrap)
    .await?
    .unwrap_or(BOOTSTRAP_BUSY_TIMEOUT_MS as i64);

    if timeout_ms <= 0 || timeout_ms as u64 == BOOTSTRAP_BUSY_TIMEOUT_MS {
        if timeout_ms <= 0 {
            warn!("Ignoring non-positive db_busy_timeout_ms ({})", timeout_ms);
        }
        return Ok(bootstrap);
    }

    // Busy timeout is a per-connection option, so reopen the pool with it
    bootstrap.close().await;
    let pool = open_pool(db_path, timeout_ms as u64).await?;
    info!("Database busy timeout set to {} ms", timeout_ms);
    Ok(pool)
}

/// Open a pool with WAL journaling, foreign keys and the given busy timeout
pub async fn open_pool(db_path: &Path, busy_timeout_ms: u64) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create every table, run migrations and ensure default settings
///
/// Split from [`init_database`] so tests can run it against any pool.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_datasets_table(pool).await?;
    create_dataset_versions_table(pool).await?;
    create_data_rows_table(pool).await?;
    create_dataset_grants_table(pool).await?;
    create_edit_requests_table(pool).await?;
    create_edit_request_details_table(pool).await?;
    create_media_attachments_table(pool).await?;
    create_audit_log_table(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;

    init_default_settings(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores runtime configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the datasets table
///
/// `current_version`, `row_count`, `byte_size` and `column_order` are the
/// dataset's current pointers. Names are unique among live datasets only.
pub async fn create_datasets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS datasets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            current_version INTEGER NOT NULL DEFAULT 1,
            row_count INTEGER NOT NULL DEFAULT 0,
            byte_size INTEGER NOT NULL DEFAULT 0,
            visibility TEXT NOT NULL CHECK (visibility IN ('private', 'public')),
            column_order TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (current_version >= 1),
            CHECK (row_count >= 0),
            CHECK (byte_size >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_datasets_live_name ON datasets(name) WHERE deleted = 0",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the dataset_versions table (immutable snapshots)
pub async fn create_dataset_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dataset_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dataset_id INTEGER NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
            version INTEGER NOT NULL,
            row_count INTEGER NOT NULL,
            byte_size INTEGER NOT NULL,
            visibility TEXT NOT NULL CHECK (visibility IN ('private', 'public')),
            column_order TEXT NOT NULL,
            content_sha256 TEXT,
            reverted_from INTEGER,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (dataset_id, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the data_rows table
///
/// `seq` records insertion order within one (dataset, version).
pub async fn create_data_rows_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS data_rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dataset_id INTEGER NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
            version INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_data_rows_version_seq ON data_rows(dataset_id, version, seq)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the dataset_grants table (explicit read access to private datasets)
pub async fn create_dataset_grants_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dataset_grants (
            dataset_id INTEGER NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            granted_at TEXT NOT NULL,
            PRIMARY KEY (dataset_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the edit_requests table
///
/// `row_id` stays NULL for new-row requests until approval binds it.
/// The `relocation_prefix` column is added by migration v1.
pub async fn create_edit_requests_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS edit_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dataset_id INTEGER NOT NULL REFERENCES datasets(id),
            row_id INTEGER,
            submitter_id TEXT NOT NULL,
            submitter_first_name TEXT NOT NULL,
            submitter_last_name TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('submitting', 'pending', 'approved', 'rejected')),
            existing_row INTEGER NOT NULL,
            consent_publish INTEGER NOT NULL DEFAULT 0,
            consent_contact INTEGER NOT NULL DEFAULT 0,
            community_tags TEXT NOT NULL DEFAULT '[]',
            binding_state TEXT NOT NULL DEFAULT 'unbound' CHECK (binding_state IN ('unbound', 'bound')),
            approved_by TEXT,
            approved_at TEXT,
            rejected_by TEXT,
            rejected_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_edit_requests_status ON edit_requests(status)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the edit_request_details table (one row per field change)
pub async fn create_edit_request_details_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS edit_request_details (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id INTEGER NOT NULL REFERENCES edit_requests(id) ON DELETE CASCADE,
            dataset_id INTEGER NOT NULL,
            row_id INTEGER,
            field_name TEXT NOT NULL,
            old_value TEXT NOT NULL DEFAULT '',
            new_value TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_edit_request_details_request ON edit_request_details(request_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the media_attachments table
pub async fn create_media_attachments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_attachments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id INTEGER NOT NULL REFERENCES edit_requests(id) ON DELETE CASCADE,
            row_id INTEGER,
            bucket TEXT NOT NULL,
            locator TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            content_type TEXT,
            byte_size INTEGER NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('photo', 'document')),
            category TEXT NOT NULL DEFAULT '',
            moderation_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (moderation_status IN ('pending', 'approved', 'rejected')),
            moderated_by TEXT,
            moderated_at TEXT,
            created_at TEXT NOT NULL,
            CHECK (byte_size >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_media_attachments_request ON media_attachments(request_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the audit_log table written by the SQLite audit sink
pub async fn create_audit_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            target TEXT NOT NULL,
            detail TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist; NULL values are reset to defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "db_busy_timeout_ms", "5000").await?;
    ensure_setting(pool, "media_default_extension", "bin").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // INSERT OR IGNORE tolerates concurrent initialization
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let reset = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();

    if reset > 0 {
        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

/// Read a setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value.flatten())
}

/// Write a setting value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}
