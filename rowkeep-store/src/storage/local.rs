//! Filesystem object store: `<root>/<bucket>/<key>`

use super::{validate_key, ObjectStore};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        validate_key(bucket)?;
        validate_key(key)?;
        Ok(self.root.join(bucket).join(key))
    }
}

fn io_error(action: &str, key: &str, err: std::io::Error) -> StoreError {
    StoreError::ObjectStore(format!("{} '{}': {}", action, key, err))
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, _content_type: Option<&str>) -> StoreResult<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create directory for", key, e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| io_error("write", key, e))?;
        debug!(bucket, key, "Stored object");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("Object {}/{}", bucket, key)))
            }
            Err(e) => Err(io_error("read", key, e)),
        }
    }

    async fn copy(&self, bucket: &str, from_key: &str, to_key: &str) -> StoreResult<()> {
        let from = self.object_path(bucket, from_key)?;
        let to = self.object_path(bucket, to_key)?;
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create directory for", to_key, e))?;
        }
        tokio::fs::copy(&from, &to)
            .await
            .map_err(|e| io_error("copy", from_key, e))?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error("delete", key, e)),
        }

        // Drop directories left empty, stopping at the bucket
        let bucket_dir = self.root.join(bucket);
        let mut dir = path.parent().map(Path::to_path_buf);
        while let Some(current) = dir {
            if current == bucket_dir || tokio::fs::remove_dir(&current).await.is_err() {
                break;
            }
            dir = current.parent().map(Path::to_path_buf);
        }
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        validate_key(bucket)?;
        let bucket_dir = self.root.join(bucket);

        let mut keys = Vec::new();
        let mut pending = vec![(bucket_dir, String::new())];
        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error("list", &key_prefix, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| io_error("list", &key_prefix, e))?
            {
                let name = entry.file_name().to_string_lossy().to_string();
                let key = format!("{}{}", key_prefix, name);
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| io_error("stat", &key, e))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), format!("{}/", key)));
                } else if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_list_copy_delete() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path());

        store.put("media", "5_A_B/one.jpg", b"1".to_vec(), Some("image/jpeg")).await.unwrap();
        store.put("media", "5_A_B/two.pdf", b"2".to_vec(), None).await.unwrap();
        store.put("media", "50_C_D/other.jpg", b"3".to_vec(), None).await.unwrap();

        let keys = store.list("media", "5_A_B/").await.unwrap();
        assert_eq!(keys, vec!["5_A_B/one.jpg", "5_A_B/two.pdf"]);

        store.copy("media", "5_A_B/one.jpg", "9/one.jpg").await.unwrap();
        assert_eq!(store.get("media", "9/one.jpg").await.unwrap(), b"1");

        store.delete("media", "5_A_B/one.jpg").await.unwrap();
        store.delete("media", "5_A_B/one.jpg").await.unwrap();
        assert!(matches!(store.get("media", "5_A_B/one.jpg").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_of_missing_bucket_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path());
        assert!(store.list("nothing", "").await.unwrap().is_empty());
    }
}
