//! Adding documents to the searchable corpus.
//!
//! Raw files are always kept under the documents prefix. In hybrid mode the
//! text is chunked and appended to the vector index; in model mode the
//! document is analysed by the provider when a document service is wired up.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::{info, warn};

use docsearch_core::data_processor::{file_metadata, list_text_files, read_file_content, relative_name, DataProcessor};
use docsearch_core::error::{Error, Result};
use docsearch_core::retry::RetryPolicy;
use docsearch_core::traits::ObjectStore;
use docsearch_core::types::{Chunk, Meta, FILENAME_KEY, STORAGE_PATH_KEY};
use docsearch_provider::{DocumentAnalysis, DocumentAnalyzer};
use docsearch_vector::{BuildReport, IndexBuilder};

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub key: String,
    pub chunks: usize,
    pub index: Option<BuildReport>,
    pub analysis: Option<DocumentAnalysis>,
}

pub struct Ingestor {
    objects: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    documents_prefix: String,
    max_document_bytes: usize,
    processor: DataProcessor,
    builder: Option<IndexBuilder>,
    analyzer: Option<DocumentAnalyzer>,
    // Index updates read-modify-write the stored corpus.
    write_lock: Mutex<()>,
}

impl Ingestor {
    pub fn new(objects: Arc<dyn ObjectStore>, retry: RetryPolicy, documents_prefix: impl Into<String>, processor: DataProcessor) -> Self {
        Self {
            objects,
            retry,
            documents_prefix: documents_prefix.into(),
            max_document_bytes: usize::MAX,
            processor,
            builder: None,
            analyzer: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_index(mut self, builder: IndexBuilder) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn with_analyzer(mut self, analyzer: DocumentAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_max_document_bytes(mut self, max: usize) -> Self {
        self.max_document_bytes = max;
        self
    }

    pub fn max_document_bytes(&self) -> usize {
        self.max_document_bytes
    }

    pub fn document_key(&self, name: &str) -> String {
        format!("{}{}", self.documents_prefix, name)
    }

    /// Store one uploaded document and make it searchable.
    pub async fn ingest(&self, name: &str, data: Vec<u8>) -> Result<IngestReport> {
        let name = sanitize_name(name)?;
        if data.len() > self.max_document_bytes {
            return Err(Error::InvalidInput(format!(
                "{name} is {} bytes, the limit is {}",
                data.len(),
                self.max_document_bytes
            )));
        }
        let text = match &self.builder {
            Some(_) => Some(
                String::from_utf8(data.clone()).map_err(|_| Error::InvalidInput(format!("{name} is not UTF-8 text")))?,
            ),
            None => None,
        };

        let key = self.document_key(&name);
        self.retry.run("document.upload", || self.objects.upload_bytes(data.clone(), &key)).await?;
        info!("Stored {} ({} bytes) at {}", name, data.len(), key);

        let mut report = IngestReport { key: key.clone(), chunks: 0, index: None, analysis: None };
        if let (Some(builder), Some(text)) = (&self.builder, text) {
            let mut meta = Meta::new();
            meta.insert(FILENAME_KEY.to_string(), Value::String(name.clone()));
            meta.insert(STORAGE_PATH_KEY.to_string(), Value::String(key.clone()));
            let chunks = self.processor.create_chunks(&text, &meta);
            report.chunks = chunks.len();
            if chunks.is_empty() {
                warn!("{name} produced no chunks; nothing to index");
            } else {
                let _guard = self.write_lock.lock().await;
                report.index = Some(builder.update_index(chunks).await?);
            }
        }
        if let Some(analyzer) = &self.analyzer {
            let staging = TempDir::new()?;
            let path = staging.path().join(&name);
            tokio::fs::write(&path, &data).await?;
            report.analysis = Some(analyzer.analyze(&path, &Meta::new()).await?);
        }
        Ok(report)
    }

    /// Chunk every text file under `dir` and rebuild the index from them,
    /// optionally storing the raw files first. Nested files keep their
    /// relative path in the storage key.
    pub async fn index_directory(&self, dir: &Path, upload: bool) -> Result<BuildReport> {
        let Some(builder) = &self.builder else {
            return Err(Error::InvalidConfig("indexing needs the hybrid search mode".into()));
        };
        let files = list_text_files(dir);
        let mut chunks: Vec<Chunk> = Vec::new();
        for path in &files {
            let key = self.document_key(&relative_name(dir, path));
            if upload {
                self.retry.run("document.upload", || self.objects.upload(path, &key)).await?;
                info!("Uploaded {} to {}", path.display(), key);
            }
            let mut meta = file_metadata(path);
            meta.insert(STORAGE_PATH_KEY.to_string(), Value::String(key));
            chunks.extend(self.processor.create_chunks(&read_file_content(path)?, &meta));
        }
        info!("Processed {} files into {} chunks", files.len(), chunks.len());
        let _guard = self.write_lock.lock().await;
        builder.create_index(chunks).await
    }
}

/// The final path component of an uploaded name.
fn sanitize_name(name: &str) -> Result<String> {
    let base = Path::new(name.trim())
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty() && n != "." && n != "..");
    base.ok_or_else(|| Error::InvalidInput(format!("invalid document name '{name}'")))
}
