use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use docsearch_core::config::expand_path;
use docsearch_core::error::{Error, Result};
use docsearch_core::traits::Embedder;

use crate::candle_err;
use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

const MAX_LEN: usize = 256;

struct EmbeddingModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl EmbeddingModel {
    fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        info!("Loading XLM-RoBERTa embedding model from {}", model_dir.display());
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::InvalidConfig(format!("Failed to load tokenizer from {}: {e}", tokenizer_path.display())))?;
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(model_dir.join("config.json"))?)?;
        let weights = candle_core::pickle::read_all(model_dir.join("pytorch_model.bin")).map_err(candle_err)?;
        let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb).map_err(candle_err)?;
        info!("Embedding model loaded");
        Ok(Self { model, tokenizer, device })
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, MAX_LEN, &self.device)?;
        let token_type_ids = Tensor::zeros((1, MAX_LEN), DType::I64, &self.device).map_err(candle_err)?;
        let hidden = self
            .model
            .forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)
            .map_err(candle_err)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb = pooled
            .to_device(&Device::Cpu)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(candle_err)?;
        if start.elapsed().as_millis() > 100 {
            warn!("Slow embedding: {:?} for {} chars", start.elapsed(), text.len());
        }
        Ok(emb)
    }
}

/// On-device embedder over a local XLM-RoBERTa checkpoint (BGE-M3 layout).
///
/// Inference runs on tokio's blocking pool.
pub struct LocalEmbedder {
    model: Arc<EmbeddingModel>,
    id: String,
    dim: usize,
}

impl LocalEmbedder {
    pub fn load(model_dir: &str, dim: usize) -> Result<Self> {
        let dir = resolve_model_dir(model_dir)?;
        let model = EmbeddingModel::load(&dir)?;
        Ok(Self { model: Arc::new(model), id: format!("local:{}:d{dim}", dir.display()), dim })
    }
}

fn resolve_model_dir(configured: &str) -> Result<PathBuf> {
    let p = expand_path(configured);
    if p.exists() {
        Ok(p)
    } else {
        Err(Error::InvalidConfig(format!("embedding.model_dir {} does not exist", p.display())))
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let texts = texts.to_vec();
        let dim = self.dim;
        tokio::task::spawn_blocking(move || {
            texts
                .iter()
                .map(|t| {
                    let v = model.embed_text(t)?;
                    if v.len() != dim {
                        return Err(Error::InvalidConfig(format!("model produces {} dims, configured {dim}", v.len())));
                    }
                    Ok(v)
                })
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| Error::Operation(format!("embedding task failed: {e}")))?
    }
}
