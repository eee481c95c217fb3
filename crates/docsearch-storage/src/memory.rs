use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use docsearch_core::error::{Error, Result};
use docsearch_core::traits::ObjectStore;

/// Process-local object store for tests and development.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn put(&self, key: &str, data: Vec<u8>) {
        self.objects.write().unwrap_or_else(PoisonError::into_inner).insert(key.to_string(), data);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;
        self.put(key, data);
        Ok(())
    }

    async fn upload_bytes(&self, data: Vec<u8>, key: &str) -> Result<()> {
        self.put(key, data);
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object {key}")))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().unwrap_or_else(PoisonError::into_inner).contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.objects.write().unwrap_or_else(PoisonError::into_inner).remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("object {key}"))),
        }
    }
}
