//! Runtime configuration for rowkeep-store
//!
//! Media settings resolve with Database → ENV → TOML → default priority.

use crate::error::StoreResult;
use rowkeep_common::config::TomlConfig;
use rowkeep_common::db::get_setting;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Bucket used when no tier configures one
pub const DEFAULT_MEDIA_BUCKET: &str = "edit-media";

/// Extension used when neither filename nor content type yields one
pub const DEFAULT_MEDIA_EXTENSION: &str = "bin";

/// Environment override for the media bucket
pub const MEDIA_BUCKET_ENV: &str = "ROWKEEP_MEDIA_BUCKET";

/// Resolved media settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSettings {
    pub bucket: String,
    pub default_extension: String,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_MEDIA_BUCKET.to_string(),
            default_extension: DEFAULT_MEDIA_EXTENSION.to_string(),
        }
    }
}

fn usable(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Resolve the media bucket
///
/// **Priority:** Database → ENV → TOML → default
pub async fn resolve_media_bucket(db: &SqlitePool, toml_config: &TomlConfig) -> StoreResult<String> {
    let db_bucket = get_setting(db, "media_bucket").await?.filter(|v| usable(v));
    let env_bucket = std::env::var(MEDIA_BUCKET_ENV).ok().filter(|v| usable(v));
    let toml_bucket = toml_config.media_bucket.clone().filter(|v| usable(v));

    let sources: Vec<&str> = [
        db_bucket.as_ref().map(|_| "database"),
        env_bucket.as_ref().map(|_| "environment"),
        toml_bucket.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();
    if sources.len() > 1 {
        warn!(
            "Media bucket found in multiple sources: {}. Using {}.",
            sources.join(", "),
            sources[0]
        );
    }

    let bucket = db_bucket
        .or(env_bucket)
        .or(toml_bucket)
        .unwrap_or_else(|| DEFAULT_MEDIA_BUCKET.to_string());
    info!(bucket = %bucket, source = sources.first().copied().unwrap_or("default"), "Media bucket resolved");
    Ok(bucket)
}

/// Resolve all media settings from the database and TOML tiers
pub async fn resolve_media_settings(db: &SqlitePool, toml_config: &TomlConfig) -> StoreResult<MediaSettings> {
    let bucket = resolve_media_bucket(db, toml_config).await?;
    let default_extension = get_setting(db, "media_default_extension")
        .await?
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| usable(ext))
        .unwrap_or_else(|| DEFAULT_MEDIA_EXTENSION.to_string());

    Ok(MediaSettings { bucket, default_extension })
}
