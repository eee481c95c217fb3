//! Model mode: the relevance provider reads whole documents and self-scores
//! passages; the budget filter decides how many of them to keep.
//!
//! Documents are staged in a per-request temporary directory that is removed
//! when the search returns, fails or is dropped mid-flight.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use docsearch_core::cancel::CancellationToken;
use docsearch_core::error::{Error, Result};
use docsearch_core::mime;
use docsearch_core::retry::RetryPolicy;
use docsearch_core::traits::{ObjectStore, RelevanceProvider};
use docsearch_core::types::{Candidate, CandidateSource, FusedResult, Meta, Method, StagedDocument, EXPLANATION_KEY, FILENAME_KEY};
use docsearch_provider::analysis::{analysis_key, is_analysis_key};
use docsearch_provider::{parse_passages, DocumentAnalysis};

use crate::budget::BudgetFilter;
use crate::prompt::search_prompt;

pub const ACTUAL_FILENAME_KEY: &str = "actual_filename";
pub const DOWNLOAD_LINK_KEY: &str = "download_link";
pub const MIME_TYPE_KEY: &str = "mime_type";

pub struct ModelSearcher {
    provider: Arc<dyn RelevanceProvider>,
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    documents_prefix: String,
    filter: BudgetFilter,
    max_concurrent_downloads: usize,
}

impl ModelSearcher {
    pub fn new(
        provider: Arc<dyn RelevanceProvider>,
        store: Arc<dyn ObjectStore>,
        retry: RetryPolicy,
        documents_prefix: impl Into<String>,
        filter: BudgetFilter,
    ) -> Self {
        Self {
            provider,
            store,
            retry,
            documents_prefix: documents_prefix.into(),
            filter,
            max_concurrent_downloads: 4,
        }
    }

    pub fn with_max_concurrent_downloads(mut self, n: usize) -> Self {
        self.max_concurrent_downloads = n.max(1);
        self
    }

    pub fn filter(&self) -> BudgetFilter {
        self.filter
    }

    /// Kept passages, highest self-reported score first.
    pub async fn search(&self, query: &str, token: &CancellationToken) -> Result<Vec<FusedResult>> {
        let started = Instant::now();
        let keys: Vec<String> = self
            .retry
            .run_cancellable("documents.list", token, || self.store.list(&self.documents_prefix))
            .await?
            .into_iter()
            .filter(|k| !is_analysis_key(k))
            .collect();
        if keys.is_empty() {
            warn!("No documents found to search");
            return Ok(vec![]);
        }
        let doc_files: Vec<String> = keys.iter().map(|k| file_name(k)).collect();

        let staging = TempDir::new()?;
        let staged = self.stage_documents(&keys, staging.path(), token).await?;
        if staged.is_empty() {
            warn!("None of {} documents could be staged", keys.len());
            return Ok(vec![]);
        }
        info!("Staged {} documents for the relevance provider", staged.len());

        let raw = match token.run(self.provider.generate(&staged, &search_prompt(query))).await {
            Ok(raw) => raw,
            Err(Error::MalformedResponse(msg)) => {
                warn!("Relevance provider gave an unusable answer: {msg}");
                return Ok(vec![]);
            }
            Err(e) => return Err(e),
        };
        drop(staging);

        let candidates: Vec<Candidate> = parse_passages(&raw)
            .into_iter()
            .map(|p| Candidate {
                source: CandidateSource::Inline { text: p.text, source: p.source },
                raw_score: p.score,
                method: Method::ModelReported,
                explanation: Some(p.explanation),
            })
            .collect();
        let reported = candidates.len();
        let kept = self.filter.apply(candidates);
        debug!("Budget filter kept {}/{} passages", kept.len(), reported);

        let mut results = Vec::with_capacity(kept.len());
        for candidate in kept {
            token.check()?;
            results.push(self.to_result(candidate, &doc_files).await);
        }
        info!("Model search returned {} results in {:?}", results.len(), started.elapsed());
        Ok(results)
    }

    /// Download every document into `dir`, keeping listing order. A document
    /// that fails to download is logged and skipped.
    async fn stage_documents(&self, keys: &[String], dir: &Path, token: &CancellationToken) -> Result<Vec<StagedDocument>> {
        let downloads = stream::iter(0..keys.len())
            .map(|i| {
                let key = &keys[i];
                async move {
                    let bytes = self.retry.run_cancellable("document.download", token, || self.store.download(key)).await;
                    (i, key, bytes)
                }
            })
            .buffered(self.max_concurrent_downloads)
            .collect::<Vec<_>>()
            .await;

        let mut staged = Vec::with_capacity(downloads.len());
        for (i, key, bytes) in downloads {
            let bytes = match bytes {
                Ok(b) => b,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    error!("Error loading file {key}: {e}");
                    continue;
                }
            };
            let name = file_name(key);
            let path = dir.join(format!("{i:04}_{name}"));
            token.run(async { Ok(tokio::fs::write(&path, &bytes).await?) }).await?;
            staged.push(StagedDocument { path, mime_type: mime::for_name(&name).to_string(), name });
        }
        Ok(staged)
    }

    async fn to_result(&self, candidate: Candidate, doc_files: &[String]) -> FusedResult {
        let (text, source) = match candidate.source {
            CandidateSource::Inline { text, source } => (text, source),
            CandidateSource::Indexed(i) => (String::new(), i.to_string()),
        };
        let mut metadata = self.document_metadata(&source, doc_files).await;
        metadata.insert(EXPLANATION_KEY.to_string(), Value::String(candidate.explanation.unwrap_or_default()));
        FusedResult { text, metadata, score: candidate.raw_score, found_by: BTreeSet::from([candidate.method]) }
    }

    /// Display metadata for a reported source, enriched from its analysis record.
    pub async fn document_metadata(&self, source: &str, doc_files: &[String]) -> Meta {
        let actual = actual_filename(doc_files, source);
        debug!("Matched source '{source}' to actual file '{actual}'");

        let key = analysis_key(&self.documents_prefix, &actual);
        let analysis = self
            .retry
            .run("analysis.download", || self.store.download(&key))
            .await
            .and_then(|bytes| Ok(serde_json::from_slice::<DocumentAnalysis>(&bytes)?));
        let (link, mime_type) = match analysis {
            Ok(a) => (a.drive_link.clone(), a.mime_type().map_or_else(|| mime::for_name(&actual).to_string(), str::to_string)),
            Err(e) => {
                debug!("No analysis for {actual} ({e}); using basic metadata");
                (String::new(), mime::for_name(&actual).to_string())
            }
        };

        let mut meta = Meta::new();
        meta.insert(FILENAME_KEY.to_string(), Value::String(source.to_string()));
        meta.insert(ACTUAL_FILENAME_KEY.to_string(), Value::String(actual));
        meta.insert(DOWNLOAD_LINK_KEY.to_string(), Value::String(link));
        meta.insert(MIME_TYPE_KEY.to_string(), Value::String(mime_type));
        meta
    }
}

/// Stored file name for a model-reported source: exact match, else the first
/// PDF, else the source as reported.
pub fn actual_filename(doc_files: &[String], source: &str) -> String {
    if doc_files.iter().any(|f| f == source) {
        return source.to_string();
    }
    doc_files
        .iter()
        .find(|f| f.to_lowercase().ends_with(".pdf"))
        .cloned()
        .unwrap_or_else(|| source.to_string())
}

fn file_name(key: &str) -> String {
    Path::new(key).file_name().map_or_else(|| key.to_string(), |n| n.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_match_wins() {
        assert_eq!(actual_filename(&files(&["a.pdf", "notes.txt"]), "notes.txt"), "notes.txt");
    }

    #[test]
    fn falls_back_to_first_pdf_then_source() {
        assert_eq!(actual_filename(&files(&["x.txt", "Manual.PDF", "b.pdf"]), "Manual"), "Manual.PDF");
        assert_eq!(actual_filename(&files(&["x.txt"]), "Field Guide"), "Field Guide");
    }

    #[test]
    fn file_name_strips_prefix() {
        assert_eq!(file_name("documents/sub/guide.md"), "guide.md");
        assert_eq!(file_name("plain"), "plain");
    }
}
