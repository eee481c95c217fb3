//! Client for a Vertex-style `:predict` text-embedding endpoint.
//!
//! Request: `{"instances":[{"content": "..."}]}`.
//! Response: `{"predictions":[{"embeddings":{"values":[...]}}]}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use docsearch_core::config::{require, EmbeddingSettings};
use docsearch_core::error::{ensure_success, Error, Result};
use docsearch_core::retry::RetryPolicy;
use docsearch_core::traits::Embedder;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct Instance<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: Vec<Instance<'a>>,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
struct Prediction {
    embeddings: Values,
}

#[derive(Deserialize)]
struct Values {
    values: Vec<f32>,
}

pub struct RemoteEmbedder {
    http: reqwest::Client,
    url: String,
    token: String,
    id: String,
    dim: usize,
    retry: RetryPolicy,
}

impl RemoteEmbedder {
    pub fn new(settings: &EmbeddingSettings, retry: RetryPolicy) -> Result<Self> {
        let endpoint = require(&settings.endpoint, "embedding.endpoint")?;
        let token = require(&settings.token, "embedding.token")?.to_string();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            http,
            url: predict_url(endpoint, &settings.model),
            token,
            id: format!("remote:{}", settings.model),
            dim: settings.dimension,
            retry,
        })
    }

    async fn predict(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = PredictRequest { instances: texts.iter().map(|t| Instance { content: t }).collect() };
        let resp = self.http.post(&self.url).bearer_auth(&self.token).json(&body).send().await?;
        let parsed: PredictResponse = ensure_success(resp).await?.json().await?;
        parse_predictions(parsed, texts.len(), self.dim)
    }
}

pub fn predict_url(endpoint: &str, model: &str) -> String {
    format!("{}/{}:predict", endpoint.trim_end_matches('/'), model)
}

fn parse_predictions(resp: PredictResponse, expected: usize, dim: usize) -> Result<Vec<Vec<f32>>> {
    if resp.predictions.len() != expected {
        return Err(Error::MalformedResponse(format!(
            "expected {expected} embeddings, got {}",
            resp.predictions.len()
        )));
    }
    resp.predictions
        .into_iter()
        .map(|p| {
            if p.embeddings.values.len() == dim {
                Ok(p.embeddings.values)
            } else {
                Err(Error::MalformedResponse(format!("embedding dimension {} != {dim}", p.embeddings.values.len())))
            }
        })
        .collect()
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        debug!("Embedding {} texts via {}", texts.len(), self.url);
        self.retry.run("embedding.predict", || self.predict(texts)).await
    }
}
