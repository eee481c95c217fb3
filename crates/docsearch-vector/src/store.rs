//! Persisted vector index + chunk metadata in object storage, loaded lazily.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use docsearch_core::config::StorageSettings;
use docsearch_core::error::{Error, Result};
use docsearch_core::retry::RetryPolicy;
use docsearch_core::traits::{ObjectStore, VectorIndex};
use docsearch_core::types::{Chunk, CorpusMetadata};

use crate::flat::FlatIndex;

/// An immutable view of one corpus generation.
#[derive(Debug)]
pub struct IndexSnapshot {
    pub generation: u64,
    pub index: FlatIndex,
    pub metadata: CorpusMetadata,
}

impl IndexSnapshot {
    pub fn empty(generation: u64, dimension: usize) -> Self {
        Self {
            generation,
            index: FlatIndex::new(dimension),
            metadata: CorpusMetadata { chunks: vec![], dimension },
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.metadata.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.chunks.is_empty()
    }
}

pub struct IndexStore {
    store: Arc<dyn ObjectStore>,
    index_key: String,
    metadata_key: String,
    retry: RetryPolicy,
    cache: RwLock<Option<Arc<IndexSnapshot>>>,
    generation: AtomicU64,
}

impl IndexStore {
    pub fn new(store: Arc<dyn ObjectStore>, settings: &StorageSettings, retry: RetryPolicy) -> Self {
        Self {
            store,
            index_key: settings.index_key.clone(),
            metadata_key: settings.metadata_key.clone(),
            retry,
            cache: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Current snapshot, downloading blob and metadata on first use.
    ///
    /// A missing index yields an empty snapshot that is not cached, so an
    /// index built later by another process is picked up.
    pub async fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        if let Some(s) = self.cache.read().await.as_ref() {
            return Ok(s.clone());
        }
        let mut slot = self.cache.write().await;
        if let Some(s) = slot.as_ref() {
            return Ok(s.clone());
        }
        match self.load().await {
            Ok((index, metadata)) => {
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                info!(
                    "Loaded index generation {}: {} vectors, {} chunks, dim {}",
                    generation,
                    index.len(),
                    metadata.chunks.len(),
                    metadata.dimension
                );
                let snap = Arc::new(IndexSnapshot { generation, index, metadata });
                *slot = Some(snap.clone());
                Ok(snap)
            }
            Err(Error::NotFound(what)) => {
                info!("No index in storage yet ({what}); serving an empty corpus");
                Ok(Arc::new(IndexSnapshot::empty(self.generation(), 0)))
            }
            Err(e) => Err(e),
        }
    }

    async fn load(&self) -> Result<(FlatIndex, CorpusMetadata)> {
        let (blob, meta) = tokio::try_join!(
            self.retry.run("index.download", || self.store.download(&self.index_key)),
            self.retry.run("metadata.download", || self.store.download(&self.metadata_key)),
        )?;
        let index = FlatIndex::from_bytes(&blob)?;
        let metadata: CorpusMetadata = serde_json::from_slice(&meta)?;
        if index.len() != metadata.chunks.len() {
            return Err(Error::Storage(format!(
                "index holds {} vectors but metadata lists {} chunks",
                index.len(),
                metadata.chunks.len()
            )));
        }
        if !metadata.chunks.is_empty() && index.dimension() != metadata.dimension {
            warn!("Metadata dimension {} differs from blob dimension {}", metadata.dimension, index.dimension());
        }
        Ok((index, metadata))
    }

    pub async fn exists(&self) -> Result<bool> {
        let (a, b) = tokio::try_join!(
            self.retry.run("index.exists", || self.store.exists(&self.index_key)),
            self.retry.run("metadata.exists", || self.store.exists(&self.metadata_key)),
        )?;
        Ok(a && b)
    }

    /// Upload blob and metadata, then publish them as a new generation.
    pub async fn save(&self, index: FlatIndex, metadata: CorpusMetadata) -> Result<Arc<IndexSnapshot>> {
        if index.len() != metadata.chunks.len() {
            return Err(Error::InvalidInput(format!(
                "{} vectors for {} chunks",
                index.len(),
                metadata.chunks.len()
            )));
        }
        let blob = index.to_bytes();
        let meta = serde_json::to_vec(&metadata)?;
        self.retry.run("index.upload", || self.store.upload_bytes(blob.clone(), &self.index_key)).await?;
        self.retry.run("metadata.upload", || self.store.upload_bytes(meta.clone(), &self.metadata_key)).await?;

        let mut slot = self.cache.write().await;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Saved index generation {} ({} chunks)", generation, metadata.chunks.len());
        let snap = Arc::new(IndexSnapshot { generation, index, metadata });
        *slot = Some(snap.clone());
        Ok(snap)
    }

    pub async fn clear_cache(&self) {
        *self.cache.write().await = None;
    }
}
