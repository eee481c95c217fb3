use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DocumentInfo, Meta, SearchHit, StagedDocument, StoredDocument};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hash:d768`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Nearest-neighbour search over an in-memory vector set.
pub trait VectorIndex: Send + Sync {
    fn dimension(&self) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn search_vec(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>>;
}

/// Key/value blob storage. Implementations make a single attempt per call;
/// callers wrap calls in a [`RetryPolicy`](crate::retry::RetryPolicy).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()>;
    async fn upload_bytes(&self, data: Vec<u8>, key: &str) -> Result<()>;
    async fn download(&self, key: &str) -> Result<Vec<u8>>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Document management. Implementations retry their own requests.
#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn upload(&self, data: Vec<u8>, name: &str, mime_type: &str, metadata: &Meta) -> Result<StoredDocument>;
    async fn download(&self, id: &str) -> Result<Vec<u8>>;
    async fn list(&self, folder_filter: Option<&str>) -> Result<Vec<DocumentInfo>>;
    async fn update_metadata(&self, id: &str, metadata: &Meta) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// A generative model that reads whole documents and answers a prompt.
#[async_trait]
pub trait RelevanceProvider: Send + Sync {
    async fn generate(&self, documents: &[StagedDocument], prompt: &str) -> Result<String>;
}
