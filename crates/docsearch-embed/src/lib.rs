//! Embedding providers behind [`docsearch_core::traits::Embedder`].

use std::sync::Arc;

use docsearch_core::config::{require, EmbeddingBackend, EmbeddingSettings};
use docsearch_core::error::{Error, Result};
use docsearch_core::retry::RetryPolicy;
use docsearch_core::traits::Embedder;

pub mod device;
pub mod hashing;
pub mod local;
pub mod pool;
pub mod remote;
pub mod tokenize;

pub use hashing::HashEmbedder;
pub use local::LocalEmbedder;
pub use pool::masked_mean_l2;
pub use remote::RemoteEmbedder;

pub(crate) fn candle_err(e: candle_core::Error) -> Error {
    Error::Operation(format!("candle: {e}"))
}

pub fn embedder_from_settings(settings: &EmbeddingSettings, retry: RetryPolicy) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match settings.provider {
        EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(settings.dimension)),
        EmbeddingBackend::Remote => Arc::new(RemoteEmbedder::new(settings, retry)?),
        EmbeddingBackend::Local => {
            let dir = require(&settings.model_dir, "embedding.model_dir")?;
            Arc::new(LocalEmbedder::load(dir, settings.dimension)?)
        }
    };
    tracing::info!("Embedder: {} (dim {})", embedder.embedder_id(), embedder.dim());
    Ok(embedder)
}
