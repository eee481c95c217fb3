use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use tracing::{debug, info};

use docsearch_core::types::{Chunk, SearchHit};

use crate::tfidf::TfIdfModel;

struct Cached {
	generation: u64,
	model: Arc<TfIdfModel>,
}

/// Keyword relevance over a chunk corpus.
///
/// The TF-IDF model is fitted on first use for a given corpus generation and
/// shared read-only afterwards. A new generation fits a fresh model outside
/// the lock and swaps it in, so concurrent readers always see a complete one.
#[derive(Default)]
pub struct KeywordIndex {
	cache: RwLock<Option<Cached>>,
}

impl KeywordIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn search(&self, generation: u64, chunks: &[Chunk], query: &str, k: usize) -> Vec<SearchHit> {
		if chunks.is_empty() || k == 0 {
			return vec![];
		}
		self.model(generation, chunks).top_k(query, k)
	}

	/// Model for `generation`, fitting it over `chunks` when not cached.
	pub fn model(&self, generation: u64, chunks: &[Chunk]) -> Arc<TfIdfModel> {
		if let Some(model) = self.cached(generation) {
			return model;
		}
		self.rebuild(generation, chunks)
	}

	/// Fit a model for `generation` and install it unless a newer one is present.
	pub fn rebuild(&self, generation: u64, chunks: &[Chunk]) -> Arc<TfIdfModel> {
		let started = Instant::now();
		let fresh = Arc::new(TfIdfModel::fit(chunks.iter().map(|c| c.text.as_str())));
		info!(
			"Keyword model fitted: generation={} docs={} terms={} in {:?}",
			generation,
			fresh.num_docs(),
			fresh.vocabulary_len(),
			started.elapsed()
		);

		let mut slot = self.cache.write().unwrap_or_else(PoisonError::into_inner);
		match slot.as_ref() {
			Some(current) if current.generation > generation => {
				debug!("Keeping newer keyword model (generation {})", current.generation);
				current.model.clone()
			}
			Some(current) if current.generation == generation => current.model.clone(),
			_ => {
				*slot = Some(Cached { generation, model: fresh.clone() });
				fresh
			}
		}
	}

	pub fn cached_generation(&self) -> Option<u64> {
		self.cache.read().unwrap_or_else(PoisonError::into_inner).as_ref().map(|c| c.generation)
	}

	pub fn invalidate(&self) {
		*self.cache.write().unwrap_or_else(PoisonError::into_inner) = None;
	}

	fn cached(&self, generation: u64) -> Option<Arc<TfIdfModel>> {
		let slot = self.cache.read().unwrap_or_else(PoisonError::into_inner);
		slot.as_ref().filter(|c| c.generation == generation).map(|c| c.model.clone())
	}
}
