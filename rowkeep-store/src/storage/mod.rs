//! Object storage for media attachments
//!
//! Objects are addressed by bucket plus a `/`-separated key. Keys are treated
//! as flat names; "directories" exist only as shared key prefixes.

pub mod local;
pub mod memory;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;

/// Object store trait - every media backend implements this
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: Option<&str>) -> StoreResult<()>;

    /// Fetch an object
    ///
    /// # Returns
    /// * `Err(StoreError::NotFound)` - No object under `key`
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>>;

    /// Server-side copy within one bucket
    async fn copy(&self, bucket: &str, from_key: &str, to_key: &str) -> StoreResult<()>;

    /// Delete an object; deleting a missing key succeeds
    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Every key starting with `prefix`, sorted
    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>>;
}

/// Reject keys that could escape their bucket on a filesystem backend
pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(StoreError::InvalidInput(format!("Invalid object key '{}'", key)));
    }
    Ok(())
}

/// Final path component of a key
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("12_Ada_Lovelace/photo.jpg").is_ok());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("").is_err());
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("7/abc.jpg"), "abc.jpg");
        assert_eq!(basename("abc.jpg"), "abc.jpg");
    }
}
