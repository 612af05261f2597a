//! In-memory object store, used by tests and dry runs

use super::{validate_key, ObjectStore};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(bucket, key)` currently stored
    pub async fn keys(&self) -> Vec<(String, String)> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, _content_type: Option<&str>) -> StoreResult<()> {
        validate_key(key)?;
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Object {}/{}", bucket, key)))
    }

    async fn copy(&self, bucket: &str, from_key: &str, to_key: &str) -> StoreResult<()> {
        validate_key(to_key)?;
        let mut objects = self.objects.write().await;
        let bytes = objects
            .get(&(bucket.to_string(), from_key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::ObjectStore(format!("copy source {} missing", from_key)))?;
        objects.insert((bucket.to_string(), to_key.to_string()), bytes);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.objects
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|(b, key)| b == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect())
    }
}
