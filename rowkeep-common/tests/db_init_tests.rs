//! Tests for database initialization
//!
//! - Automatic database creation with default schema
//! - Reopening an existing database
//! - Default settings and NULL repair
//! - Partial unique index on live dataset names

use rowkeep_common::db::init::{ensure_setting, get_setting, init_database, set_setting};
use rowkeep_common::db::migrations::get_schema_version;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("rowkeep.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("rowkeep.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_all_tables_created() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("rowkeep.db")).await.unwrap();

    for table in [
        "settings",
        "datasets",
        "dataset_versions",
        "data_rows",
        "dataset_grants",
        "edit_requests",
        "edit_request_details",
        "media_attachments",
        "audit_log",
    ] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "table {} missing", table);
    }

    assert_eq!(get_schema_version(&pool).await.unwrap(), 1);

    let has_marker: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('edit_requests') WHERE name = 'relocation_prefix'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(has_marker, 1);
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("rowkeep.db")).await.unwrap();

    // Bucket is resolved across tiers, so it has no stored default
    assert_eq!(get_setting(&pool, "media_bucket").await.unwrap(), None);
    assert_eq!(get_setting(&pool, "media_default_extension").await.unwrap().as_deref(), Some("bin"));
    assert_eq!(get_setting(&pool, "db_busy_timeout_ms").await.unwrap().as_deref(), Some("5000"));
}

#[tokio::test]
async fn test_null_setting_reset_to_default() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("rowkeep.db")).await.unwrap();

    sqlx::query("UPDATE settings SET value = NULL WHERE key = 'media_default_extension'")
        .execute(&pool)
        .await
        .unwrap();

    ensure_setting(&pool, "media_default_extension", "bin").await.unwrap();
    assert_eq!(get_setting(&pool, "media_default_extension").await.unwrap().as_deref(), Some("bin"));
}

#[tokio::test]
async fn test_existing_setting_not_overwritten() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("rowkeep.db");
    let pool = init_database(&db_path).await.unwrap();

    set_setting(&pool, "media_default_extension", "dat").await.unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    assert_eq!(get_setting(&pool, "media_default_extension").await.unwrap().as_deref(), Some("dat"));
}

#[tokio::test]
async fn test_custom_busy_timeout_reopens_pool() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("rowkeep.db");
    let pool = init_database(&db_path).await.unwrap();
    set_setting(&pool, "db_busy_timeout_ms", "750").await.unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(timeout, 750);
}

#[tokio::test]
async fn test_live_dataset_names_unique_but_deleted_names_reusable() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("rowkeep.db")).await.unwrap();

    let insert = r#"
        INSERT INTO datasets (name, visibility, column_order, deleted, created_by, created_at, updated_at)
        VALUES (?, 'public', '[]', ?, 'tester', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')
    "#;

    sqlx::query(insert).bind("Wells").bind(1).execute(&pool).await.unwrap();
    sqlx::query(insert).bind("Wells").bind(0).execute(&pool).await.unwrap();
    let duplicate = sqlx::query(insert).bind("Wells").bind(0).execute(&pool).await;
    assert!(duplicate.is_err(), "second live dataset with same name must be rejected");

    // Case-sensitive: a different spelling is a different name
    sqlx::query(insert).bind("wells").bind(0).execute(&pool).await.unwrap();
}
