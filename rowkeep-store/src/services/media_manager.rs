//! Media attachment manager
//!
//! Uploads land under a staging prefix keyed by the edit request
//! (`<requestID>_<First>_<Last>/`) or, for edits of existing rows, directly
//! under the row prefix (`<rowID>/`). Approval of a new-row request relocates
//! the staged objects under the minted row's prefix.

use crate::config::MediaSettings;
use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::models::{MediaAttachment, MediaUpload, ModerationStatus, Submitter};
use crate::storage::{basename, ObjectStore};
use rowkeep_common::time;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extensions for content types whose registry entry is ambiguous
const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/pjpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/heic", "heic"),
    ("image/heif", "heif"),
    ("image/tiff", "tiff"),
    ("application/pdf", "pdf"),
    ("text/plain", "txt"),
    ("text/csv", "csv"),
    ("application/msword", "doc"),
    ("application/vnd.openxmlformats-officedocument.wordprocessingml.document", "docx"),
    ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", "xlsx"),
];

/// One object moved by [`MediaManager::relocate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocatedObject {
    pub from: String,
    pub to: String,
}

/// Object key of an upload relative to its base prefix
fn object_key(prefix: &str, extension: &str) -> String {
    format!("{}{}.{}", prefix, Uuid::new_v4(), extension)
}

/// Replace characters that do not belong in an object key segment
fn key_segment(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// Staging prefix of a new-row request
pub fn staging_prefix(request_id: i64, submitter: &Submitter) -> String {
    format!(
        "{}_{}_{}/",
        request_id,
        key_segment(&submitter.first_name),
        key_segment(&submitter.last_name)
    )
}

/// Permanent prefix of a row
pub fn row_prefix(row_id: i64) -> String {
    format!("{}/", row_id)
}

/// Derive an object extension
///
/// Filename extension first, then the content type (fixed table, then the
/// first registry extension in sorted order), then `default_extension`.
pub fn derive_extension(filename: &str, content_type: Option<&str>, default_extension: &str) -> String {
    if let Some((stem, ext)) = filename.rsplit_once('.') {
        let ext = ext.trim();
        if !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return ext.to_ascii_lowercase();
        }
    }

    if let Some(content_type) = content_type {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if let Some((_, ext)) = CONTENT_TYPE_EXTENSIONS.iter().find(|(ct, _)| *ct == essence) {
            return ext.to_string();
        }

        if let Some(exts) = mime_guess::get_mime_extensions_str(&essence) {
            let mut exts: Vec<&str> = exts.to_vec();
            exts.sort_unstable();
            if let Some(ext) = exts.first() {
                return ext.to_string();
            }
        }
    }

    default_extension.to_string()
}

fn check_cancelled(cancel: &CancellationToken, action: &str) -> StoreResult<()> {
    if cancel.is_cancelled() {
        return Err(StoreError::Cancelled(action.to_string()));
    }
    Ok(())
}

/// Stages, relocates, moderates and fetches media attachments
#[derive(Clone)]
pub struct MediaManager {
    db: SqlitePool,
    store: Arc<dyn ObjectStore>,
    settings: MediaSettings,
}

impl MediaManager {
    pub fn new(db: SqlitePool, store: Arc<dyn ObjectStore>, settings: MediaSettings) -> Self {
        Self { db, store, settings }
    }

    pub fn bucket(&self) -> &str {
        &self.settings.bucket
    }

    /// Upload one blob under `prefix` and return its locator
    ///
    /// Any failure, cancellation included, is an `Upload` error.
    pub async fn stage(&self, upload: &MediaUpload, prefix: &str, cancel: &CancellationToken) -> StoreResult<String> {
        if cancel.is_cancelled() {
            return Err(StoreError::Upload(format!("Upload of '{}' cancelled", upload.filename)));
        }

        let extension = derive_extension(
            &upload.filename,
            upload.content_type.as_deref(),
            &self.settings.default_extension,
        );
        let key = object_key(prefix, &extension);

        self.store
            .put(&self.settings.bucket, &key, upload.bytes.clone(), upload.content_type.as_deref())
            .await
            .map_err(|e| StoreError::Upload(format!("'{}': {}", upload.filename, e)))?;

        debug!(key = %key, bytes = upload.bytes.len(), "Staged upload");
        Ok(key)
    }

    /// Best-effort removal of objects, e.g. after an abandoned submission
    pub async fn discard(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.store.delete(&self.settings.bucket, key).await {
                warn!(key = %key, error = %e, "Could not remove staged object");
            }
        }
    }

    /// Move every object under `source_prefix` to `dest_prefix`
    ///
    /// All copies are made before any source is deleted. On error nothing has
    /// moved: partial copies are removed and deleted sources are restored.
    pub async fn relocate(
        &self,
        source_prefix: &str,
        dest_prefix: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<RelocatedObject>> {
        let bucket = &self.settings.bucket;

        check_cancelled(cancel, "relocation cancelled before listing")?;
        let keys = self
            .store
            .list(bucket, source_prefix)
            .await
            .map_err(|e| StoreError::Relocation(format!("list {}: {}", source_prefix, e)))?;

        let moves: Vec<RelocatedObject> = keys
            .into_iter()
            .map(|from| {
                let to = format!("{}{}", dest_prefix, basename(&from));
                RelocatedObject { from, to }
            })
            .collect();

        let mut copied = Vec::with_capacity(moves.len());
        for object in &moves {
            let result = match check_cancelled(cancel, "relocation cancelled during copy") {
                Ok(()) => self
                    .store
                    .copy(bucket, &object.from, &object.to)
                    .await
                    .map_err(|e| StoreError::Relocation(format!("copy {}: {}", object.from, e))),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                self.discard(&copied).await;
                return Err(e);
            }
            copied.push(object.to.clone());
        }

        let mut deleted: Vec<&RelocatedObject> = Vec::with_capacity(moves.len());
        for object in &moves {
            let result = match check_cancelled(cancel, "relocation cancelled during delete") {
                Ok(()) => self
                    .store
                    .delete(bucket, &object.from)
                    .await
                    .map_err(|e| StoreError::Relocation(format!("delete {}: {}", object.from, e))),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                for restored in &deleted {
                    if let Err(restore_err) = self.store.copy(bucket, &restored.to, &restored.from).await {
                        warn!(key = %restored.from, error = %restore_err, "Could not restore relocated source");
                    }
                }
                self.discard(&copied).await;
                return Err(e);
            }
            deleted.push(object);
        }

        info!(from = source_prefix, to = dest_prefix, objects = moves.len(), "Relocated media");
        Ok(moves)
    }

    /// Undo a completed relocation, best-effort
    ///
    /// Each object present at its new key is copied back and the new key
    /// removed. Returns how many objects were moved back.
    pub async fn move_back(&self, moves: &[RelocatedObject]) -> usize {
        let bucket = &self.settings.bucket;
        let mut restored = 0;
        for object in moves {
            if let Err(e) = self.store.copy(bucket, &object.to, &object.from).await {
                warn!(key = %object.to, error = %e, "Could not move object back to staging");
                continue;
            }
            if let Err(e) = self.store.delete(bucket, &object.to).await {
                warn!(key = %object.to, error = %e, "Could not remove relocated copy");
            }
            restored += 1;
        }
        restored
    }

    /// Objects currently stored under a prefix
    pub async fn list_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.store.list(&self.settings.bucket, prefix).await
    }

    pub async fn approve_photos(&self, ids: &[i64], reviewer: &str) -> StoreResult<()> {
        self.moderate(ids, ModerationStatus::Approved, reviewer).await
    }

    pub async fn reject_photos(&self, ids: &[i64], reviewer: &str) -> StoreResult<()> {
        self.moderate(ids, ModerationStatus::Rejected, reviewer).await
    }

    /// Moderation is independent of the parent request's status
    async fn moderate(&self, ids: &[i64], status: ModerationStatus, reviewer: &str) -> StoreResult<()> {
        let unique: Vec<i64> = ids.iter().copied().collect::<HashSet<_>>().into_iter().collect();
        if unique.is_empty() {
            return Err(StoreError::InvalidInput("No attachment ids given".to_string()));
        }

        let mut tx = self.db.begin().await?;
        let updated = db::media::set_moderation(&mut tx, &unique, status, reviewer, &time::now()).await?;
        if updated != unique.len() as u64 {
            // Dropping the transaction rolls back the partial update
            return Err(StoreError::NotFound(format!(
                "{} of {} attachments do not exist",
                unique.len() as u64 - updated,
                unique.len()
            )));
        }
        tx.commit().await?;

        info!(count = unique.len(), status = status.as_str(), reviewer, "Attachments moderated");
        Ok(())
    }

    pub async fn get_attachment(&self, attachment_id: i64) -> StoreResult<MediaAttachment> {
        let mut conn = self.db.acquire().await?;
        db::media::load_attachment(&mut conn, attachment_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Attachment {}", attachment_id)))
    }

    /// Attachment record plus its bytes
    pub async fn fetch(&self, attachment_id: i64) -> StoreResult<(MediaAttachment, Vec<u8>)> {
        let attachment = self.get_attachment(attachment_id).await?;
        let bytes = self.store.get(&attachment.bucket, &attachment.locator).await?;
        Ok((attachment, bytes))
    }
}
