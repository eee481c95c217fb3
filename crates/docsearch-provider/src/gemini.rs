//! Relevance provider backed by the Gemini `generateContent` REST endpoint.
//!
//! Staged documents travel inline as base64 parts ahead of the text prompt.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use docsearch_core::config::{require, ProviderSettings};
use docsearch_core::error::{ensure_success, Error, Result};
use docsearch_core::retry::RetryPolicy;
use docsearch_core::traits::RelevanceProvider;
use docsearch_core::types::StagedDocument;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Inline { inline_data: InlineData },
    Text { text: String },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

pub struct GeminiProvider {
    http: reqwest::Client,
    url: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
    retry: RetryPolicy,
}

impl GeminiProvider {
    pub fn new(settings: &ProviderSettings, retry: RetryPolicy) -> Result<Self> {
        let api_key = require(&settings.api_key, "provider.api_key")?.to_string();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            http,
            url: format!("{}/models/{}:generateContent", settings.endpoint.trim_end_matches('/'), settings.model),
            api_key,
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            retry,
        })
    }

    async fn build_request(&self, documents: &[StagedDocument], prompt: &str) -> Result<GenerateRequest> {
        let mut parts = Vec::with_capacity(documents.len() + 1);
        for doc in documents {
            let bytes = tokio::fs::read(&doc.path).await?;
            parts.push(Part::Inline { inline_data: InlineData { mime_type: doc.mime_type.clone(), data: STANDARD.encode(bytes) } });
        }
        parts.push(Part::Text { text: prompt.to_string() });
        Ok(GenerateRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig { temperature: self.temperature, max_output_tokens: self.max_output_tokens },
        })
    }

    async fn call(&self, body: &GenerateRequest) -> Result<String> {
        let resp = self.http.post(&self.url).header("x-goog-api-key", &self.api_key).json(body).send().await?;
        let parsed: GenerateResponse = ensure_success(resp).await?.json().await?;
        response_text(parsed)
    }
}

fn response_text(resp: GenerateResponse) -> Result<String> {
    let text: String = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.is_empty() {
        return Err(Error::MalformedResponse("provider returned no text".into()));
    }
    Ok(text)
}

#[async_trait]
impl RelevanceProvider for GeminiProvider {
    async fn generate(&self, documents: &[StagedDocument], prompt: &str) -> Result<String> {
        let body = self.build_request(documents, prompt).await?;
        debug!("Provider request: {} documents, prompt {} chars", documents.len(), prompt.len());
        self.retry.run("provider.generate", || self.call(&body)).await
    }
}
