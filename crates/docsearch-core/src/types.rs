//! Domain types shared by the retrieval engines and the search service.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type ChunkId = String;
pub type Meta = BTreeMap<String, serde_json::Value>;

/// Metadata key carrying the source document name.
pub const FILENAME_KEY: &str = "filename";
/// Metadata key carrying the object-storage key of the raw document.
pub const STORAGE_PATH_KEY: &str = "gcs_path";
/// Metadata key carrying the model's explanation of a match.
pub const EXPLANATION_KEY: &str = "relevance_explanation";

/// A bounded span of document text that is independently indexed.
///
/// - `id`: unique within one corpus build (`{filename}:{n}`)
/// - `text`: the payload, at most `chunking.chunk_size` characters
/// - `metadata`: source filename, storage path, content hash, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    #[serde(default)]
    pub metadata: Meta,
}

impl Chunk {
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }
}

/// The persisted chunk records that sit next to the vector blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusMetadata {
    pub chunks: Vec<Chunk>,
    pub dimension: usize,
}

/// Which retrieval strategy produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Semantic,
    Keyword,
    ModelReported,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Keyword => "keyword",
            Self::ModelReported => "model_reported",
        }
    }
}

/// One ranked hit from a single index: a corpus position and its raw score.
///
/// `score` is method-specific but higher is always better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub index: usize,
    pub score: f32,
    pub method: Method,
}

/// Where a candidate's text lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CandidateSource {
    /// Position of a chunk in the loaded corpus.
    Indexed(usize),
    /// Text returned directly by the relevance provider.
    Inline { text: String, source: String },
}

/// A single retrieval hit before cross-method fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub source: CandidateSource,
    pub raw_score: f32,
    pub method: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl From<SearchHit> for Candidate {
    fn from(hit: SearchHit) -> Self {
        Self { source: CandidateSource::Indexed(hit.index), raw_score: hit.score, method: hit.method, explanation: None }
    }
}

/// A ranked passage after fusion, filtering and grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub text: String,
    pub metadata: Meta,
    pub score: f32,
    pub found_by: BTreeSet<Method>,
}

impl FusedResult {
    pub fn source(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }

    pub fn explanation(&self) -> Option<&str> {
        self.source(EXPLANATION_KEY)
    }
}

/// Final ranked output of a search, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchResponse {
    pub results: Vec<FusedResult>,
}

impl SearchResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl IntoIterator for SearchResponse {
    type Item = FusedResult;
    type IntoIter = std::vec::IntoIter<FusedResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// A file written to local disk so a relevance provider can read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDocument {
    pub path: std::path::PathBuf,
    pub name: String,
    pub mime_type: String,
}

/// Result of uploading a file to the document-management service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub link: String,
}

/// A listing entry from the document-management service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub link: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}
