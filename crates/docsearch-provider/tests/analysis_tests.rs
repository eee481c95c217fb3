use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use docsearch_core::error::{Error, Result};
use docsearch_core::retry::RetryPolicy;
use docsearch_core::traits::{DocumentService, ObjectStore, RelevanceProvider};
use docsearch_core::types::{DocumentInfo, Meta, StagedDocument, StoredDocument};
use docsearch_provider::analysis::analysis_key;
use docsearch_provider::{DocumentAnalysis, DocumentAnalyzer};
use docsearch_storage::MemoryObjectStore;

struct CannedProvider(String);

#[async_trait]
impl RelevanceProvider for CannedProvider {
    async fn generate(&self, documents: &[StagedDocument], _prompt: &str) -> Result<String> {
        assert_eq!(documents.len(), 1);
        assert!(documents[0].path.exists());
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct RecordingDocs {
    uploads: Mutex<Vec<(String, String, Meta)>>,
}

#[async_trait]
impl DocumentService for RecordingDocs {
    async fn upload(&self, _data: Vec<u8>, name: &str, mime_type: &str, metadata: &Meta) -> Result<StoredDocument> {
        self.uploads.lock().unwrap().push((name.to_string(), mime_type.to_string(), metadata.clone()));
        Ok(StoredDocument { id: "file-1".into(), link: "https://docs.example/file-1".into() })
    }
    async fn download(&self, _id: &str) -> Result<Vec<u8>> {
        Err(Error::NotFound("unused".into()))
    }
    async fn list(&self, _folder_filter: Option<&str>) -> Result<Vec<DocumentInfo>> {
        Ok(vec![])
    }
    async fn update_metadata(&self, _id: &str, _metadata: &Meta) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _id: &str) -> Result<bool> {
        Ok(true)
    }
}

#[tokio::test]
async fn analyze_uploads_and_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("guide.md");
    std::fs::write(&path, "# Rainwater\nCollect it.").unwrap();

    let provider = Arc::new(CannedProvider(r#"{"analysis":"about water","topics":["water"],"details":"barrels"}"#.into()));
    let docs = Arc::new(RecordingDocs::default());
    let store = Arc::new(MemoryObjectStore::new());
    let analyzer = DocumentAnalyzer::new(provider, docs.clone(), store.clone(), RetryPolicy::immediate(1), "documents/");

    let record = analyzer.analyze(&path, &Meta::new()).await.unwrap();
    assert_eq!(record.drive_link, "https://docs.example/file-1");
    assert_eq!(record.mime_type(), Some("text/markdown"));

    let uploads = docs.uploads.lock().unwrap();
    assert_eq!(uploads[0].0, "guide.md");
    assert_eq!(uploads[0].2["topics"], serde_json::json!("[\"water\"]"));

    let stored = store.download(&analysis_key("documents/", "guide.md")).await.unwrap();
    let parsed: DocumentAnalysis = serde_json::from_slice(&stored).unwrap();
    assert_eq!(parsed, record);
}

#[tokio::test]
async fn unsupported_types_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("archive.zip");
    std::fs::write(&path, [0u8; 4]).unwrap();
    let analyzer = DocumentAnalyzer::new(
        Arc::new(CannedProvider(String::new())),
        Arc::new(RecordingDocs::default()),
        Arc::new(MemoryObjectStore::new()),
        RetryPolicy::immediate(1),
        "documents/",
    );
    assert!(matches!(analyzer.analyze(&path, &Meta::new()).await, Err(Error::InvalidInput(_))));
}
