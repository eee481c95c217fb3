use std::sync::Arc;

use docsearch_core::config::{EmbeddingSettings, StorageSettings};
use docsearch_core::data_processor::CONTENT_HASH_KEY;
use docsearch_core::error::Error;
use docsearch_core::retry::RetryPolicy;
use docsearch_core::traits::{Embedder, ObjectStore, VectorIndex};
use docsearch_core::types::{Chunk, FILENAME_KEY, STORAGE_PATH_KEY};
use docsearch_embed::HashEmbedder;
use docsearch_storage::MemoryObjectStore;
use docsearch_vector::{IndexBuilder, IndexStore};

fn chunk(file: &str, n: usize, text: &str) -> Chunk {
    let mut c = Chunk { id: format!("{file}:{n}"), text: text.to_string(), metadata: Default::default() };
    c.metadata.insert(FILENAME_KEY.into(), file.into());
    c
}

fn setup() -> (Arc<MemoryObjectStore>, Arc<IndexStore>, IndexBuilder, Arc<HashEmbedder>) {
    let objects = Arc::new(MemoryObjectStore::new());
    let store = Arc::new(IndexStore::new(objects.clone(), &StorageSettings::default(), RetryPolicy::immediate(1)));
    let embedder = Arc::new(HashEmbedder::new(512));
    let settings = EmbeddingSettings { dimension: 512, batch_size: 2, batch_delay_ms: 0, ..Default::default() };
    let builder = IndexBuilder::new(store.clone(), embedder.clone(), &settings);
    (objects, store, builder, embedder)
}

#[tokio::test]
async fn empty_storage_is_an_empty_corpus() {
    let (_, store, _, _) = setup();
    assert!(!store.exists().await.unwrap());
    let snap = store.snapshot().await.unwrap();
    assert!(snap.is_empty());
    assert_eq!(snap.index.len(), 0);
}

#[tokio::test]
async fn create_then_search_then_reload() {
    let (objects, store, builder, embedder) = setup();
    let chunks = vec![
        chunk("a.txt", 0, "solar panel wiring basics"),
        chunk("a.txt", 1, "battery bank maintenance"),
        chunk("b.txt", 0, "goat cheese recipe"),
    ];
    let report = builder.create_index(chunks).await.unwrap();
    assert_eq!(report.added, 3);
    assert_eq!(report.total, 3);
    assert!(store.exists().await.unwrap());
    assert!(objects.exists("index/vectors.bin").await.unwrap());

    let snap = store.snapshot().await.unwrap();
    assert_eq!(snap.generation, report.generation);
    assert!(snap.chunks().iter().all(|c| c.meta_str(CONTENT_HASH_KEY).is_some()));

    let q = embedder.embed_batch(&["goat cheese".to_string()]).await.unwrap().remove(0);
    let hits = snap.index.search_vec(&q, 2).unwrap();
    assert_eq!(hits[0].index, 2);
    assert!(hits[0].score >= hits[1].score);

    // A fresh store over the same objects reads the persisted state.
    let reopened = IndexStore::new(objects.clone(), &StorageSettings::default(), RetryPolicy::immediate(1));
    let loaded = reopened.snapshot().await.unwrap();
    assert_eq!(loaded.chunks(), snap.chunks());
    assert_eq!(loaded.index, snap.index);

    store.clear_cache().await;
    let again = store.snapshot().await.unwrap();
    assert!(again.generation > snap.generation);
}

#[tokio::test]
async fn update_skips_already_indexed_content() {
    let (_, store, builder, _) = setup();
    builder.create_index(vec![chunk("a.txt", 0, "first"), chunk("a.txt", 1, "second")]).await.unwrap();
    let report = builder
        .update_index(vec![chunk("b.txt", 0, "second"), chunk("b.txt", 1, "third"), chunk("b.txt", 2, "third")])
        .await
        .unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.total, 3);
    let snap = store.snapshot().await.unwrap();
    assert_eq!(snap.chunks().last().map(|c| c.text.as_str()), Some("third"));
}

#[tokio::test]
async fn update_without_index_creates_one() {
    let (_, store, builder, _) = setup();
    let report = builder.update_index(vec![chunk("a.txt", 0, "only")]).await.unwrap();
    assert_eq!(report.total, 1);
    assert_eq!(store.snapshot().await.unwrap().chunks().len(), 1);
}

#[tokio::test]
async fn create_rejects_empty_input() {
    let (_, _, builder, _) = setup();
    assert!(matches!(builder.create_index(vec![]).await, Err(Error::InvalidInput(_))));
}

fn stored(key: &str, n: usize, text: &str) -> Chunk {
    let mut c = chunk(key.rsplit('/').next().unwrap_or(key), n, text);
    c.id = format!("{key}:{n}");
    c.metadata.insert(STORAGE_PATH_KEY.into(), key.into());
    c
}

#[tokio::test]
async fn update_replaces_chunks_of_the_same_document() {
    let (_, store, builder, _) = setup();
    builder.create_index(vec![stored("documents/notes.txt", 0, "first version"), chunk("a.txt", 0, "other")]).await.unwrap();

    let report = builder.update_index(vec![stored("documents/notes.txt", 0, "second version")]).await.unwrap();
    assert_eq!(report.replaced, 1);
    assert_eq!(report.added, 1);
    assert_eq!(report.total, 2);

    let snap = store.snapshot().await.unwrap();
    let ids: std::collections::HashSet<_> = snap.chunks().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids.len(), snap.chunks().len());
    assert_eq!(snap.index.len(), snap.chunks().len());
    let texts: Vec<_> = snap.chunks().iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["other", "second version"]);
}

#[tokio::test]
async fn colliding_ids_are_rejected() {
    let (_, store, builder, _) = setup();
    assert!(matches!(
        builder.create_index(vec![chunk("a.txt", 0, "one"), chunk("a.txt", 0, "two")]).await,
        Err(Error::InvalidInput(_))
    ));
    builder.create_index(vec![chunk("a.txt", 0, "one")]).await.unwrap();
    let err = builder.update_index(vec![chunk("a.txt", 0, "changed")]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(store.snapshot().await.unwrap().chunks().len(), 1);
}
