//! Vector + keyword retrieval over the stored corpus.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use docsearch_core::cancel::CancellationToken;
use docsearch_core::error::{Error, Result};
use docsearch_core::traits::{Embedder, VectorIndex};
use docsearch_core::types::{FusedResult, SearchHit};
use docsearch_text::KeywordIndex;
use docsearch_vector::{IndexSnapshot, IndexStore};

use crate::fusion::fuse_hybrid;
use crate::ranking::rank;

pub struct HybridSearcher {
    store: Arc<IndexStore>,
    embedder: Arc<dyn Embedder>,
    keyword: Arc<KeywordIndex>,
    alpha: f32,
}

impl HybridSearcher {
    pub fn new(store: Arc<IndexStore>, embedder: Arc<dyn Embedder>, keyword: Arc<KeywordIndex>, alpha: f32) -> Self {
        Self { store, embedder, keyword, alpha }
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn keyword_index(&self) -> &Arc<KeywordIndex> {
        &self.keyword
    }

    /// Up to `k` fused results, best first.
    pub async fn search(&self, query: &str, k: usize, token: &CancellationToken) -> Result<Vec<FusedResult>> {
        let started = Instant::now();
        let snapshot = token.run(self.store.snapshot()).await?;
        if snapshot.is_empty() {
            info!("No documents indexed; returning no results for query");
            return Ok(vec![]);
        }

        let (semantic, keyword) = tokio::try_join!(
            self.semantic_hits(&snapshot, query, k, token),
            self.keyword_hits(snapshot.clone(), query, k, token),
        )?;
        debug!("semantic={} keyword={} hits for generation {}", semantic.len(), keyword.len(), snapshot.generation);

        let fused = fuse_hybrid(snapshot.chunks(), self.alpha, &semantic, &keyword);
        let ranked = rank(fused, k);
        info!("Hybrid search returned {} results in {:?}", ranked.len(), started.elapsed());
        Ok(ranked)
    }

    /// Keyword relevance only, fused with the keyword weight.
    pub async fn keyword_search(&self, query: &str, k: usize, token: &CancellationToken) -> Result<Vec<FusedResult>> {
        let snapshot = token.run(self.store.snapshot()).await?;
        if snapshot.is_empty() {
            info!("No documents indexed; returning no results for query");
            return Ok(vec![]);
        }
        let keyword = self.keyword_hits(snapshot.clone(), query, k, token).await?;
        Ok(rank(fuse_hybrid(snapshot.chunks(), self.alpha, &[], &keyword), k))
    }

    async fn semantic_hits(
        &self,
        snapshot: &IndexSnapshot,
        query: &str,
        k: usize,
        token: &CancellationToken,
    ) -> Result<Vec<SearchHit>> {
        if snapshot.index.dimension() != self.embedder.dim() {
            return Err(Error::InvalidConfig(format!(
                "index dimension {} does not match embedder {} ({})",
                snapshot.index.dimension(),
                self.embedder.embedder_id(),
                self.embedder.dim()
            )));
        }
        let mut vectors = token.run(self.embedder.embed_batch(&[query.to_string()])).await?;
        let Some(query_vec) = vectors.pop() else {
            return Err(Error::MalformedResponse("embedder returned no vector for the query".into()));
        };
        snapshot.index.search_vec(&query_vec, k)
    }

    /// Fitting the keyword model is CPU-bound, so it runs off the async workers.
    async fn keyword_hits(
        &self,
        snapshot: Arc<IndexSnapshot>,
        query: &str,
        k: usize,
        token: &CancellationToken,
    ) -> Result<Vec<SearchHit>> {
        let keyword = self.keyword.clone();
        let query = query.to_string();
        let task = tokio::task::spawn_blocking(move || keyword.search(snapshot.generation, snapshot.chunks(), &query, k));
        token
            .run(async { task.await.map_err(|e| Error::Operation(format!("keyword search task failed: {e}"))) })
            .await
    }
}
