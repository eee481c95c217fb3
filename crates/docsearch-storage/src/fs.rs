//! Object store over a local directory; keys map to relative paths.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use docsearch_core::error::{Error, Result};
use docsearch_core::traits::ObjectStore;

pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let escapes = rel.components().any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(Error::InvalidInput(format!("invalid object key {key:?}")));
        }
        Ok(self.root.join(rel))
    }

    /// Write via a sibling temp file and rename so readers never see partial objects.
    async fn write_atomic(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension(format!("{}.partial", std::process::id()));
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Stored {} ({} bytes)", key, data.len());
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;
        self.write_atomic(key, &data).await
    }

    async fn upload_bytes(&self, data: Vec<u8>, key: &str) -> Result<()> {
        self.write_atomic(key, &data).await
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|e| match Error::from(e) {
            Error::NotFound(_) => Error::NotFound(format!("object {key}")),
            other => other,
        })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || {
            let mut keys: Vec<String> = walkdir::WalkDir::new(&root)
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| {
                    let rel = e.path().strip_prefix(&root).ok()?;
                    let key = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
                    (!key.ends_with(".partial") && key.starts_with(&prefix)).then_some(key)
                })
                .collect();
            keys.sort();
            keys
        })
        .await
        .map_err(|e| Error::Storage(format!("listing task failed: {e}")))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }
}
