//! The search entry point used by the HTTP API, the chat handlers and the CLI.

use std::sync::Arc;

use tracing::info;

use docsearch_core::cancel::CancellationToken;
use docsearch_core::config::{SearchMode, SearchSettings, Settings};
use docsearch_core::data_processor::DataProcessor;
use docsearch_core::error::{Error, Result};
use docsearch_core::retry::RetryPolicy;
use docsearch_core::traits::{DocumentService, Embedder, ObjectStore, RelevanceProvider};
use docsearch_core::types::SearchResponse;
use docsearch_embed::embedder_from_settings;
use docsearch_provider::{DocumentAnalyzer, GeminiProvider};
use docsearch_storage::{object_store_from_settings, DriveClient};
use docsearch_text::KeywordIndex;
use docsearch_vector::{IndexBuilder, IndexStore};

use crate::budget::BudgetFilter;
use crate::engine::HybridSearcher;
use crate::grouping::group_by_source;
use crate::ingest::Ingestor;
use crate::model::ModelSearcher;
use crate::ranking::rank;

/// Per-request knobs; unset values fall back to `search.*` settings.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub max_results: Option<usize>,
    pub cancellation: CancellationToken,
}

impl SearchOptions {
    pub fn top_k(k: usize) -> Self {
        Self { top_k: Some(k), ..Self::default() }
    }
}

pub enum Engine {
    Hybrid(HybridSearcher),
    Model(ModelSearcher),
}

pub struct SearchService {
    engine: Engine,
    settings: SearchSettings,
}

impl SearchService {
    pub fn new(engine: Engine, settings: SearchSettings) -> Self {
        Self { engine, settings }
    }

    pub fn mode(&self) -> SearchMode {
        match self.engine {
            Engine::Hybrid(_) => SearchMode::Hybrid,
            Engine::Model(_) => SearchMode::Model,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("query must not be empty".into()));
        }
        let top_k = options.top_k.unwrap_or(self.settings.top_k).max(1);
        let max_results = options.max_results.unwrap_or(self.settings.max_results);
        let token = &options.cancellation;

        let (results, cap) = match &self.engine {
            Engine::Hybrid(searcher) => (searcher.search(query, top_k, token).await?, max_results),
            // The budget filter sizes model results; an explicit top_k only caps them.
            Engine::Model(searcher) => {
                (searcher.search(query, token).await?, options.top_k.map_or(max_results, |k| k.min(max_results)))
            }
        };
        let results = if self.settings.group_by_source {
            group_by_source(results, &self.settings.source_key)
        } else {
            results
        };
        Ok(SearchResponse { results: rank(results, cap) })
    }
}

/// Everything a process needs, built once from [`Settings`] and shared.
pub struct Components {
    pub settings: Settings,
    pub retry: RetryPolicy,
    pub objects: Arc<dyn ObjectStore>,
    pub index: Arc<IndexStore>,
    pub keyword: Arc<KeywordIndex>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub provider: Option<Arc<dyn RelevanceProvider>>,
    pub documents: Option<Arc<dyn DocumentService>>,
}

impl Components {
    /// Missing credentials for the configured mode are fatal here.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let retry = RetryPolicy::from(&settings.retry);
        let objects = object_store_from_settings(&settings.storage)?;
        let index = Arc::new(IndexStore::new(objects.clone(), &settings.storage, retry.clone()));

        let (embedder, provider, documents) = match settings.search.mode {
            SearchMode::Hybrid => (Some(embedder_from_settings(&settings.embedding, retry.clone())?), None, None),
            SearchMode::Model => {
                let provider: Arc<dyn RelevanceProvider> = Arc::new(GeminiProvider::new(&settings.provider, retry.clone())?);
                let documents: Option<Arc<dyn DocumentService>> = match settings.documents.token {
                    Some(_) => Some(Arc::new(DriveClient::new(&settings.documents, retry.clone())?)),
                    None => {
                        info!("documents.token not set; uploads will not be analysed");
                        None
                    }
                };
                (None, Some(provider), documents)
            }
        };

        Ok(Self {
            settings: settings.clone(),
            retry,
            objects,
            index,
            keyword: Arc::new(KeywordIndex::new()),
            embedder,
            provider,
            documents,
        })
    }

    pub fn search_service(&self) -> Result<SearchService> {
        let s = &self.settings;
        let engine = match (s.search.mode, &self.embedder, &self.provider) {
            (SearchMode::Hybrid, Some(embedder), _) => {
                Engine::Hybrid(HybridSearcher::new(self.index.clone(), embedder.clone(), self.keyword.clone(), s.search.alpha))
            }
            (SearchMode::Model, _, Some(provider)) => Engine::Model(
                ModelSearcher::new(
                    provider.clone(),
                    self.objects.clone(),
                    self.retry.clone(),
                    s.storage.documents_prefix.clone(),
                    BudgetFilter::from(&s.search),
                )
                .with_max_concurrent_downloads(s.provider.max_concurrent_downloads),
            ),
            (mode, _, _) => return Err(Error::InvalidConfig(format!("search mode {mode:?} is missing its backend"))),
        };
        info!("Search service ready in {:?} mode", s.search.mode);
        Ok(SearchService::new(engine, s.search.clone()))
    }

    pub fn ingestor(&self) -> Ingestor {
        let s = &self.settings;
        let mut ingestor = Ingestor::new(
            self.objects.clone(),
            self.retry.clone(),
            s.storage.documents_prefix.clone(),
            DataProcessor::new(&s.chunking),
        )
        .with_max_document_bytes(s.storage.max_document_bytes);
        if let Some(embedder) = &self.embedder {
            ingestor = ingestor.with_index(IndexBuilder::new(self.index.clone(), embedder.clone(), &s.embedding));
        }
        if let (Some(provider), Some(documents)) = (&self.provider, &self.documents) {
            ingestor = ingestor.with_analyzer(DocumentAnalyzer::new(
                provider.clone(),
                documents.clone(),
                self.objects.clone(),
                self.retry.clone(),
                s.storage.documents_prefix.clone(),
            ));
        }
        ingestor
    }
}
