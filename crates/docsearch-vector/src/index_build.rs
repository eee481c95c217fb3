//! Embeds chunks and persists them through an [`IndexStore`].
//!
//! Typical flow:
//! 1) chunk documents with `docsearch_core::data_processor`
//! 2) `create_index` for a fresh corpus, or `update_index` to append; chunks
//!    that name a storage key replace every stored chunk with the same key
//! 3) the store publishes a new generation; searchers pick it up on next use

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use docsearch_core::config::EmbeddingSettings;
use docsearch_core::data_processor::{content_hash, CONTENT_HASH_KEY};
use docsearch_core::error::{Error, Result};
use docsearch_core::traits::{Embedder, VectorIndex};
use docsearch_core::types::{Chunk, CorpusMetadata, STORAGE_PATH_KEY};

use crate::flat::FlatIndex;
use crate::store::{IndexSnapshot, IndexStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub generation: u64,
    pub added: usize,
    pub skipped: usize,
    pub replaced: usize,
    pub total: usize,
}

pub struct IndexBuilder {
    store: Arc<IndexStore>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    batch_delay: Duration,
    show_progress: bool,
}

impl IndexBuilder {
    pub fn new(store: Arc<IndexStore>, embedder: Arc<dyn Embedder>, settings: &EmbeddingSettings) -> Self {
        Self {
            store,
            embedder,
            batch_size: settings.batch_size.max(1),
            batch_delay: Duration::from_millis(settings.batch_delay_ms),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Replace whatever is stored with an index over `chunks`.
    pub async fn create_index(&self, chunks: Vec<Chunk>) -> Result<BuildReport> {
        if chunks.is_empty() {
            return Err(Error::InvalidInput("no chunks to index".into()));
        }
        let chunks: Vec<Chunk> = chunks.into_iter().map(with_hash).collect();
        ensure_unique_ids(&[], &chunks)?;
        let vectors = self.embed_all(&chunks).await?;
        let mut index = FlatIndex::new(self.embedder.dim());
        index.add(&vectors)?;
        let added = chunks.len();
        let snap = self.store.save(index, CorpusMetadata { chunks, dimension: self.embedder.dim() }).await?;
        info!("Created index generation {} with {} chunks", snap.generation, added);
        Ok(report(&snap, added, 0, 0))
    }

    /// Append `new_chunks` to the stored index, skipping content already indexed.
    ///
    /// Stored chunks whose storage key appears among `new_chunks` are dropped first,
    /// so re-ingesting a document replaces its previous version.
    pub async fn update_index(&self, new_chunks: Vec<Chunk>) -> Result<BuildReport> {
        if !self.store.exists().await? {
            info!("No existing index, creating a new one");
            return self.create_index(new_chunks).await;
        }
        let current = self.store.snapshot().await?;
        if current.metadata.dimension != self.embedder.dim() {
            return Err(Error::InvalidConfig(format!(
                "stored index has dimension {}, embedder {} produces {}",
                current.metadata.dimension,
                self.embedder.embedder_id(),
                self.embedder.dim()
            )));
        }

        let sources: HashSet<String> =
            new_chunks.iter().filter_map(|c| c.meta_str(STORAGE_PATH_KEY)).map(str::to_string).collect();
        let stale: Vec<bool> = current
            .chunks()
            .iter()
            .map(|c| c.meta_str(STORAGE_PATH_KEY).is_some_and(|s| sources.contains(s)))
            .collect();
        let replaced = stale.iter().filter(|s| **s).count();
        let mut index = current.index.retain_rows(|i| stale.get(i) != Some(&true));
        let mut metadata = current.metadata.clone();
        metadata.chunks = current.chunks().iter().zip(&stale).filter(|(_, s)| !**s).map(|(c, _)| c.clone()).collect();

        let mut seen: HashSet<String> = metadata
            .chunks
            .iter()
            .map(|c| c.meta_str(CONTENT_HASH_KEY).map_or_else(|| content_hash(&c.text), str::to_string))
            .collect();
        let offered = new_chunks.len();
        let fresh: Vec<Chunk> = new_chunks
            .into_iter()
            .map(with_hash)
            .filter(|c| c.meta_str(CONTENT_HASH_KEY).is_some_and(|h| seen.insert(h.to_string())))
            .collect();
        let skipped = offered - fresh.len();
        if fresh.is_empty() && replaced == 0 {
            info!("All {} chunks already indexed", offered);
            return Ok(report(&current, 0, skipped, 0));
        }
        ensure_unique_ids(&metadata.chunks, &fresh)?;

        if !fresh.is_empty() {
            index.add(&self.embed_all(&fresh).await?)?;
        }
        let added = fresh.len();
        metadata.chunks.extend(fresh);
        let snap = self.store.save(index, metadata).await?;
        info!(
            "Updated index to generation {}: +{} chunks, {} replaced ({} duplicates skipped)",
            snap.generation, added, replaced, skipped
        );
        Ok(report(&snap, added, skipped, replaced))
    }

    async fn embed_all(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let pb = if self.show_progress {
            let pb = ProgressBar::new(chunks.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut vectors = Vec::with_capacity(chunks.len());
        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            if i > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self.embedder.embed_batch(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(Error::MalformedResponse(format!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
            pb.inc(batch.len() as u64);
            pb.set_message(format!("batch {}", i + 1));
        }
        pb.finish_with_message("embedding done");
        if vectors.iter().any(|v| v.len() != self.embedder.dim()) {
            warn!("Embedder {} returned vectors of unexpected size", self.embedder.embedder_id());
        }
        Ok(vectors)
    }
}

fn with_hash(mut chunk: Chunk) -> Chunk {
    if chunk.meta_str(CONTENT_HASH_KEY).is_none() {
        let h = content_hash(&chunk.text);
        chunk.metadata.insert(CONTENT_HASH_KEY.to_string(), serde_json::Value::String(h));
    }
    chunk
}

/// Chunk ids are unique within a corpus.
fn ensure_unique_ids(existing: &[Chunk], fresh: &[Chunk]) -> Result<()> {
    let mut ids: HashSet<&str> = existing.iter().map(|c| c.id.as_str()).collect();
    match fresh.iter().find(|c| !ids.insert(c.id.as_str())) {
        Some(dup) => Err(Error::InvalidInput(format!("chunk id {} is already in the corpus", dup.id))),
        None => Ok(()),
    }
}

fn report(snap: &IndexSnapshot, added: usize, skipped: usize, replaced: usize) -> BuildReport {
    BuildReport { generation: snap.generation, added, skipped, replaced, total: snap.index.len() }
}
