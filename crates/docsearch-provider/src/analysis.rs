//! Whole-document analysis at upload time.
//!
//! The provider summarises the document, the document service stores it with
//! the summary as properties, and an analysis record is written to object
//! storage next to the raw documents for later metadata lookups.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use docsearch_core::error::{Error, Result};
use docsearch_core::mime;
use docsearch_core::retry::RetryPolicy;
use docsearch_core::traits::{DocumentService, ObjectStore, RelevanceProvider};
use docsearch_core::types::{Meta, StagedDocument};

use crate::repair::repair_json;

pub const ANALYSIS_PROMPT: &str = "Please analyze this document and provide:
1. A structured analysis of the key points and themes
2. The main topics covered
3. Important details or specifications
Format as JSON with keys: 'analysis', 'topics', 'details'";

/// Persisted analysis record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    #[serde(default)]
    pub drive_link: String,
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub analysis: Value,
    #[serde(default)]
    pub topics: Value,
    #[serde(default)]
    pub details: Value,
    #[serde(default)]
    pub metadata: Meta,
}

impl DocumentAnalysis {
    pub fn mime_type(&self) -> Option<&str> {
        self.metadata.get("mime_type").and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

/// `{prefix}analysis/{stem}_analysis.json`
pub fn analysis_key(documents_prefix: &str, filename: &str) -> String {
    let stem = Path::new(filename).file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    format!("{documents_prefix}analysis/{stem}_analysis.json")
}

pub fn is_analysis_key(key: &str) -> bool {
    key.ends_with("_analysis.json")
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisBody {
    pub analysis: Value,
    pub topics: Value,
    pub details: Value,
}

/// Parse the provider's analysis; malformed JSON keeps the raw text as the analysis.
pub fn parse_analysis(raw: &str) -> AnalysisBody {
    match repair_json(raw, '{', '}') {
        Some(Value::Object(o)) => AnalysisBody {
            analysis: o.get("analysis").cloned().unwrap_or_else(|| Value::String(String::new())),
            topics: o.get("topics").cloned().unwrap_or_else(|| Value::Array(vec![])),
            details: o.get("details").cloned().unwrap_or_else(|| Value::String(String::new())),
        },
        _ => {
            warn!("Analysis response was not JSON; keeping raw text");
            AnalysisBody {
                analysis: Value::String(raw.to_string()),
                topics: Value::Array(vec![]),
                details: Value::String(String::new()),
            }
        }
    }
}

pub struct DocumentAnalyzer {
    provider: Arc<dyn RelevanceProvider>,
    documents: Arc<dyn DocumentService>,
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    documents_prefix: String,
}

impl DocumentAnalyzer {
    pub fn new(
        provider: Arc<dyn RelevanceProvider>,
        documents: Arc<dyn DocumentService>,
        store: Arc<dyn ObjectStore>,
        retry: RetryPolicy,
        documents_prefix: impl Into<String>,
    ) -> Self {
        Self { provider, documents, store, retry, documents_prefix: documents_prefix.into() }
    }

    pub async fn analyze(&self, path: &Path, extra: &Meta) -> Result<DocumentAnalysis> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::InvalidInput(format!("not a file path: {}", path.display())))?;
        if !mime::is_supported(&name) {
            return Err(Error::InvalidInput(format!("Unsupported file type: {name}")));
        }
        let mime_type = mime::for_name(&name).to_string();
        let staged = StagedDocument { path: path.to_path_buf(), name: name.clone(), mime_type: mime_type.clone() };

        let raw = self.provider.generate(std::slice::from_ref(&staged), ANALYSIS_PROMPT).await?;
        let body = parse_analysis(&raw);

        let mut metadata = extra.clone();
        metadata.insert("mime_type".into(), Value::String(mime_type.clone()));
        metadata.insert("file_name".into(), Value::String(name.clone()));
        metadata.insert("analysis".into(), Value::String(body.analysis.to_string()));
        metadata.insert("topics".into(), Value::String(body.topics.to_string()));
        metadata.insert("details".into(), Value::String(body.details.to_string()));

        let data = tokio::fs::read(path).await?;
        let stored = self.documents.upload(data, &name, &mime_type, &metadata).await?;
        metadata.insert("download_link".into(), Value::String(stored.link.clone()));

        let record = DocumentAnalysis {
            drive_link: stored.link,
            file_id: stored.id,
            analysis: body.analysis,
            topics: body.topics,
            details: body.details,
            metadata,
        };
        let key = analysis_key(&self.documents_prefix, &name);
        let json = serde_json::to_vec(&record)?;
        self.retry.run("analysis.upload", || self.store.upload_bytes(json.clone(), &key)).await?;
        info!("Analyzed {} -> {}", name, key);
        Ok(record)
    }
}
