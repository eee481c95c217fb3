use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use docsearch_core::cancel::CancellationToken;
use docsearch_core::config::{EmbeddingSettings, SearchSettings, StorageBackend, StorageSettings};
use docsearch_core::data_processor::DataProcessor;
use docsearch_core::error::{Error, Result, TransientKind};
use docsearch_core::retry::RetryPolicy;
use docsearch_core::traits::{ObjectStore, RelevanceProvider};
use docsearch_core::types::{Chunk, Method, StagedDocument, FILENAME_KEY};
use docsearch_embed::HashEmbedder;
use docsearch_hybrid::{BudgetFilter, Engine, HybridSearcher, Ingestor, ModelSearcher, SearchOptions, SearchService};
use docsearch_storage::{GcsObjectStore, MemoryObjectStore};
use docsearch_text::KeywordIndex;
use docsearch_vector::{IndexBuilder, IndexStore};

const DIM: usize = 256;

struct Hybrid {
    service: SearchService,
    searcher: HybridSearcher,
    builder: IndexBuilder,
    ingestor: Ingestor,
}

fn hybrid(objects: Arc<MemoryObjectStore>) -> Hybrid {
    let store = Arc::new(IndexStore::new(objects.clone(), &StorageSettings::default(), RetryPolicy::immediate(1)));
    let embedder = Arc::new(HashEmbedder::new(DIM));
    let keyword = Arc::new(KeywordIndex::new());
    let embedding = EmbeddingSettings { dimension: DIM, batch_delay_ms: 0, ..Default::default() };
    let settings = SearchSettings::default();
    Hybrid {
        service: SearchService::new(
            Engine::Hybrid(HybridSearcher::new(store.clone(), embedder.clone(), keyword.clone(), settings.alpha)),
            settings.clone(),
        ),
        searcher: HybridSearcher::new(store.clone(), embedder.clone(), keyword, settings.alpha),
        builder: IndexBuilder::new(store.clone(), embedder.clone(), &embedding),
        ingestor: Ingestor::new(objects, RetryPolicy::immediate(1), "documents/", DataProcessor::default())
            .with_index(IndexBuilder::new(store, embedder, &embedding))
            .with_max_document_bytes(64),
    }
}

fn chunk(source: &str, text: &str) -> Chunk {
    let mut c = Chunk { id: format!("{source}:{text}"), text: text.into(), metadata: Default::default() };
    c.metadata.insert(FILENAME_KEY.into(), source.into());
    c
}

#[tokio::test]
async fn empty_corpus_returns_no_results() {
    let h = hybrid(Arc::new(MemoryObjectStore::new()));
    let out = h.service.search("anything", &SearchOptions::default()).await.unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn keyword_path_ranks_the_matching_chunk_first() {
    let h = hybrid(Arc::new(MemoryObjectStore::new()));
    h.builder.create_index(vec![chunk("A", "the quick brown fox"), chunk("B", "lazy dogs sleep")]).await.unwrap();

    let hits = h.searcher.keyword_search("fox", 2, &CancellationToken::new()).await.unwrap();
    assert_eq!(hits[0].source(FILENAME_KEY), Some("A"));
    assert!(hits[0].score > 0.0);
    assert!(hits.len() < 2 || hits[0].score > hits[1].score);
    assert!(hits[0].found_by.contains(&Method::Keyword));

    let fused = h.service.search("fox", &SearchOptions::top_k(2)).await.unwrap();
    assert_eq!(fused.results[0].source(FILENAME_KEY), Some("A"));
    assert_eq!(
        fused.results[0].found_by,
        [Method::Semantic, Method::Keyword].into_iter().collect()
    );
}

#[tokio::test]
async fn response_is_truncated_and_grouped() {
    let h = hybrid(Arc::new(MemoryObjectStore::new()));
    let chunks = vec![
        chunk("a.txt", "goats need shelter"),
        chunk("a.txt", "goats need hay"),
        chunk("b.txt", "goats climb fences"),
        chunk("c.txt", "goats and sheep"),
    ];
    h.builder.create_index(chunks).await.unwrap();

    let out = h
        .service
        .search("goats", &SearchOptions { top_k: Some(4), max_results: Some(2), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(out.len(), 2);
    let sources: Vec<_> = out.results.iter().filter_map(|r| r.source(FILENAME_KEY)).collect();
    assert_eq!(sources.len(), 2);
    assert_ne!(sources[0], sources[1]);
}

#[tokio::test]
async fn equal_scores_keep_index_order() {
    let h = hybrid(Arc::new(MemoryObjectStore::new()));
    let chunks = vec![
        chunk("z.txt", "rain barrels overflow"),
        chunk("m.txt", "solar panels face south"),
        chunk("a.txt", "rain barrels overflow"),
    ];
    h.builder.create_index(chunks).await.unwrap();

    for _ in 0..5 {
        let out = h.service.search("rain barrels", &SearchOptions::top_k(3)).await.unwrap();
        let sources: Vec<_> = out.results.iter().filter_map(|r| r.source(FILENAME_KEY)).collect();
        assert_eq!(&sources[..2], ["z.txt", "a.txt"]);
        assert_eq!(out.results[0].score, out.results[1].score);
    }
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let h = hybrid(Arc::new(MemoryObjectStore::new()));
    let err = h.service.search("   ", &SearchOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn cancelled_search_unwinds() {
    let h = hybrid(Arc::new(MemoryObjectStore::new()));
    let token = CancellationToken::new();
    token.cancel();
    let opts = SearchOptions { cancellation: token, ..Default::default() };
    assert!(matches!(h.service.search("fox", &opts).await, Err(Error::Cancelled)));
}

#[tokio::test]
async fn ingested_documents_become_searchable() {
    let objects = Arc::new(MemoryObjectStore::new());
    let h = hybrid(objects.clone());
    let report = h.ingestor.ingest("solar.txt", b"solar panels charge batteries".to_vec()).await.unwrap();
    assert_eq!(report.key, "documents/solar.txt");
    assert_eq!(report.chunks, 1);
    assert!(objects.exists("documents/solar.txt").await.unwrap());

    let out = h.service.search("solar", &SearchOptions::default()).await.unwrap();
    assert_eq!(out.results[0].source(FILENAME_KEY), Some("solar.txt"));

    let err = h.ingestor.ingest("blob.bin", vec![0xff, 0xfe]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    let err = h.ingestor.ingest("big.txt", vec![b'a'; 65]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn reingesting_a_document_replaces_its_chunks() {
    let objects = Arc::new(MemoryObjectStore::new());
    let h = hybrid(objects.clone());
    h.ingestor.ingest("notes.txt", b"first version".to_vec()).await.unwrap();
    let report = h.ingestor.ingest("notes.txt", b"second version".to_vec()).await.unwrap();
    assert_eq!(report.index.map(|r| r.replaced), Some(1));

    let snap = h.searcher.store().snapshot().await.unwrap();
    let ids: Vec<_> = snap.chunks().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["documents/notes.txt:0"]);
    assert_eq!(snap.chunks()[0].text, "second version");
}

#[tokio::test]
async fn directory_indexing_uploads_and_rebuilds() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("goats.txt"), "goat milk makes good cheese").unwrap();
    std::fs::write(dir.path().join("wind.md"), "a small wind turbine for the barn").unwrap();
    std::fs::create_dir(dir.path().join("barn")).unwrap();
    std::fs::write(dir.path().join("barn").join("goats.txt"), "goats sleep in the barn loft").unwrap();
    let objects = Arc::new(MemoryObjectStore::new());
    let h = hybrid(objects.clone());

    let report = h.ingestor.index_directory(dir.path(), true).await.unwrap();
    assert_eq!(report.total, 3);
    assert!(objects.exists("documents/goats.txt").await.unwrap());
    assert!(objects.exists("documents/barn/goats.txt").await.unwrap());
    assert!(objects.exists("documents/wind.md").await.unwrap());

    let out = h.service.search("wind turbine", &SearchOptions::default()).await.unwrap();
    assert_eq!(out.results[0].source(FILENAME_KEY), Some("wind.md"));
}

// Model mode

#[derive(Default)]
struct ScriptedProvider {
    answer: Option<String>,
    fail_with_malformed: bool,
    delay: Option<Duration>,
    staged: Mutex<Vec<PathBuf>>,
}

impl ScriptedProvider {
    fn answering(answer: &str) -> Self {
        Self { answer: Some(answer.to_string()), ..Default::default() }
    }

    fn staged_paths(&self) -> Vec<PathBuf> {
        self.staged.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelevanceProvider for ScriptedProvider {
    async fn generate(&self, documents: &[StagedDocument], prompt: &str) -> Result<String> {
        assert!(prompt.contains("Search Query:"));
        for d in documents {
            assert!(d.path.exists(), "{} should be staged", d.name);
        }
        self.staged.lock().unwrap().extend(documents.iter().map(|d| d.path.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_with_malformed {
            return Err(Error::MalformedResponse("no candidates".into()));
        }
        self.answer.clone().ok_or_else(|| Error::Operation("provider down".into()))
    }
}

/// Fails `list` transiently a fixed number of times before delegating.
struct FlakyList {
    inner: MemoryObjectStore,
    failures: AtomicUsize,
}

#[async_trait]
impl ObjectStore for FlakyList {
    async fn upload(&self, local_path: &std::path::Path, key: &str) -> Result<()> {
        self.inner.upload(local_path, key).await
    }
    async fn upload_bytes(&self, data: Vec<u8>, key: &str) -> Result<()> {
        self.inner.upload_bytes(data, key).await
    }
    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.download(key).await
    }
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::transient(TransientKind::ConnectionReset, "reset by peer"));
        }
        self.inner.list(prefix).await
    }
    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }
    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }
}

async fn documents() -> Arc<MemoryObjectStore> {
    let objects = Arc::new(MemoryObjectStore::new());
    objects.upload_bytes(b"%PDF-1.4 fake".to_vec(), "documents/doc1.pdf").await.unwrap();
    objects.upload_bytes(b"field notes".to_vec(), "documents/notes.txt").await.unwrap();
    objects
}

fn model_service(provider: Arc<ScriptedProvider>, objects: Arc<dyn ObjectStore>) -> SearchService {
    let settings = SearchSettings { min_score: 0.90, budget: 2.0, ..Default::default() };
    let searcher =
        ModelSearcher::new(provider, objects, RetryPolicy::immediate(3), "documents/", BudgetFilter::from(&settings));
    SearchService::new(Engine::Model(searcher), settings)
}

const TWO_PASSAGES: &str = r#"[{"text":"x","score":0.95,"source":"doc1","explanation":"direct answer"},{"text":"y","score":0.80,"source":"doc1"}]"#;

#[tokio::test]
async fn threshold_keeps_only_the_confident_passage() {
    let provider = Arc::new(ScriptedProvider::answering(TWO_PASSAGES));
    let service = model_service(provider.clone(), documents().await);

    let out = service.search("water", &SearchOptions::default()).await.unwrap();
    assert_eq!(out.len(), 1);
    let r = &out.results[0];
    assert_eq!(r.text, "x");
    assert_eq!(r.score, 0.95);
    assert_eq!(r.source(FILENAME_KEY), Some("doc1"));
    assert_eq!(r.source("actual_filename"), Some("doc1.pdf"));
    assert_eq!(r.source("mime_type"), Some("application/pdf"));
    assert_eq!(r.source("download_link"), Some(""));
    assert_eq!(r.explanation(), Some("direct answer"));
    assert_eq!(r.found_by, [Method::ModelReported].into_iter().collect());

    assert_eq!(provider.staged_paths().len(), 2);
    assert!(provider.staged_paths().iter().all(|p| !p.exists()));
}

#[tokio::test]
async fn explicit_top_k_caps_model_results() {
    let answer = r#"[{"text":"x","score":0.95,"source":"doc1"},{"text":"y","score":0.94,"source":"notes.txt"}]"#;
    let provider = Arc::new(ScriptedProvider::answering(answer));
    let service = model_service(provider, documents().await);

    assert_eq!(service.search("water", &SearchOptions::default()).await.unwrap().len(), 2);
    let capped = service.search("water", &SearchOptions::top_k(1)).await.unwrap();
    assert_eq!(capped.len(), 1);
    assert_eq!(capped.results[0].text, "x");
}

#[tokio::test]
async fn analysis_record_supplies_download_link() {
    let objects = documents().await;
    let record = serde_json::json!({
        "drive_link": "https://drive.example/doc1",
        "file_id": "f1",
        "metadata": { "mime_type": "application/pdf" }
    });
    objects
        .upload_bytes(serde_json::to_vec(&record).unwrap(), "documents/analysis/doc1_analysis.json")
        .await
        .unwrap();
    let provider = Arc::new(ScriptedProvider::answering(TWO_PASSAGES));
    let out = model_service(provider.clone(), objects).search("water", &SearchOptions::default()).await.unwrap();
    assert_eq!(out.results[0].source("download_link"), Some("https://drive.example/doc1"));
    // Analysis records are never staged as documents.
    assert_eq!(provider.staged_paths().len(), 2);
}

#[tokio::test]
async fn truncated_provider_output_yields_no_results() {
    let provider = Arc::new(ScriptedProvider::answering("```json\n[{\"text\":\"a\""));
    let out = model_service(provider, documents().await).search("water", &SearchOptions::default()).await.unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn malformed_provider_error_yields_no_results() {
    let provider = Arc::new(ScriptedProvider { fail_with_malformed: true, ..Default::default() });
    let out = model_service(provider, documents().await).search("water", &SearchOptions::default()).await.unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn provider_failure_propagates_and_cleans_up() {
    let provider = Arc::new(ScriptedProvider::default());
    let err = model_service(provider.clone(), documents().await)
        .search("water", &SearchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Operation(_)));
    assert!(!provider.staged_paths().is_empty());
    assert!(provider.staged_paths().iter().all(|p| !p.exists()));
}

#[tokio::test]
async fn cancellation_during_generation_cleans_up() {
    let provider = Arc::new(ScriptedProvider {
        answer: Some(TWO_PASSAGES.into()),
        delay: Some(Duration::from_secs(30)),
        ..Default::default()
    });
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let opts = SearchOptions { cancellation: token, ..Default::default() };
    let out = model_service(provider.clone(), documents().await).search("water", &opts).await;
    assert!(matches!(out, Err(Error::Cancelled)));
    assert!(provider.staged_paths().iter().all(|p| !p.exists()));
}

#[tokio::test]
async fn no_documents_is_not_an_error() {
    let provider = Arc::new(ScriptedProvider::answering(TWO_PASSAGES));
    let out = model_service(provider.clone(), Arc::new(MemoryObjectStore::new()))
        .search("water", &SearchOptions::default())
        .await
        .unwrap();
    assert!(out.is_empty());
    assert!(provider.staged_paths().is_empty());
}

#[tokio::test]
async fn transient_listing_failures_are_retried() {
    let inner = MemoryObjectStore::new();
    inner.upload_bytes(b"%PDF".to_vec(), "documents/doc1.pdf").await.unwrap();
    let objects = Arc::new(FlakyList { inner, failures: AtomicUsize::new(2) });
    let provider = Arc::new(ScriptedProvider::answering(TWO_PASSAGES));
    let out = model_service(provider, objects.clone()).search("water", &SearchOptions::default()).await.unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(objects.failures.load(Ordering::SeqCst), 0);
}

/// Counts requests to an endpoint that always answers `503`.
async fn unavailable_gcs() -> (GcsObjectStore, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            let _ = socket
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
            let _ = socket.shutdown().await;
        }
    });
    let settings = StorageSettings {
        backend: StorageBackend::Gcs,
        bucket: Some("bucket".into()),
        token: Some("t".into()),
        endpoint: format!("http://{addr}/"),
        ..Default::default()
    };
    (GcsObjectStore::new(&settings).unwrap(), hits)
}

#[tokio::test]
async fn unavailable_storage_is_tried_exactly_max_retries_times() {
    let (gcs, hits) = unavailable_gcs().await;
    let provider = Arc::new(ScriptedProvider::answering(TWO_PASSAGES));
    let err = model_service(provider.clone(), Arc::new(gcs)).search("q", &SearchOptions::default()).await.unwrap_err();
    assert!(err.is_transient(), "{err}");
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert!(provider.staged_paths().is_empty());
}
