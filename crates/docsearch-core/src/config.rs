//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_SEARCH__ALPHA=0.6`). Every field
//! has a default so a missing file yields a usable development setup.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name };
        config.validate_for_env()?;
        Ok(config)
    }

    /// Build from an inline TOML document; used by tests and tools.
    pub fn from_toml_str(toml: &str, env_name: &str) -> Result<Self> {
        let config = Self { figment: Figment::new().merge(Toml::string(toml)), env_name: env_name.to_string() };
        config.validate_for_env()?;
        Ok(config)
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self) -> Result<()> {
        let settings = self.settings()?;
        match self.env_name.as_str() {
            "prod" | "production" => {
                if settings.storage.backend == StorageBackend::Memory {
                    return Err(Error::InvalidConfig("prod config must not use the in-memory storage backend".into()));
                }
                if settings.embedding.provider == EmbeddingBackend::Hash {
                    return Err(Error::InvalidConfig("prod config must not use the hashing embedder".into()));
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search: SearchSettings,
    pub retry: RetrySettings,
    pub storage: StorageSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub provider: ProviderSettings,
    pub documents: DocumentsSettings,
    pub server: ServerSettings,
    pub slack: SlackSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let s = &self.search;
        if !(s.alpha > 0.0 && s.alpha < 1.0) {
            return Err(Error::InvalidConfig(format!("search.alpha must be in (0, 1), got {}", s.alpha)));
        }
        if !(0.0..=1.0).contains(&s.min_score) {
            return Err(Error::InvalidConfig(format!("search.min_score must be in [0, 1], got {}", s.min_score)));
        }
        if s.budget <= 0.0 {
            return Err(Error::InvalidConfig(format!("search.budget must be positive, got {}", s.budget)));
        }
        if s.top_k == 0 || s.max_results == 0 {
            return Err(Error::InvalidConfig("search.top_k and search.max_results must be >= 1".into()));
        }
        if self.retry.max_retries == 0 {
            return Err(Error::InvalidConfig("retry.max_retries must be >= 1".into()));
        }
        if self.retry.backoff_factor < 1.0 {
            return Err(Error::InvalidConfig(format!("retry.backoff_factor must be >= 1.0, got {}", self.retry.backoff_factor)));
        }
        let c = &self.chunking;
        if c.chunk_size == 0 || c.chunk_overlap >= c.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking requires 0 <= chunk_overlap < chunk_size, got {} / {}",
                c.chunk_overlap, c.chunk_size
            )));
        }
        if self.embedding.batch_size == 0 || self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size and embedding.dimension must be >= 1".into()));
        }
        if self.provider.max_concurrent_downloads == 0 {
            return Err(Error::InvalidConfig("provider.max_concurrent_downloads must be >= 1".into()));
        }
        Ok(())
    }
}

/// Return the value of a required secret or setting, or a fatal configuration error.
pub fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::InvalidConfig(format!("{key} must be set"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Vector + TF-IDF fusion over the prebuilt index.
    Hybrid,
    /// Whole documents handed to the relevance provider.
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub mode: SearchMode,
    pub alpha: f32,
    pub top_k: usize,
    pub max_results: usize,
    pub min_score: f32,
    pub budget: f32,
    pub group_by_source: bool,
    pub source_key: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            mode: SearchMode::Hybrid,
            alpha: 0.5,
            top_k: 5,
            max_results: 10,
            min_score: 0.90,
            budget: 2.0,
            group_by_source: true,
            source_key: crate::types::FILENAME_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub delay_unit_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_retries: 3, backoff_factor: 2.0, delay_unit_ms: 1000, jitter: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Fs,
    Memory,
    Gcs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub root: String,
    pub bucket: Option<String>,
    pub token: Option<String>,
    pub endpoint: String,
    pub documents_prefix: String,
    pub index_key: String,
    pub metadata_key: String,
    pub max_document_bytes: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            root: "./dev_data/bucket".to_string(),
            bucket: None,
            token: None,
            endpoint: "https://storage.googleapis.com".to_string(),
            documents_prefix: "documents/".to_string(),
            index_key: "index/vectors.bin".to_string(),
            metadata_key: "index/metadata.json".to_string(),
            max_document_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 1000, chunk_overlap: 200 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    Hash,
    Remote,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingBackend,
    pub dimension: usize,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub endpoint: Option<String>,
    pub model: String,
    pub token: Option<String>,
    pub model_dir: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Hash,
            dimension: 768,
            batch_size: 5,
            batch_delay_ms: 1000,
            endpoint: None,
            model: "textembedding-gecko@003".to_string(),
            token: None,
            model_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub max_concurrent_downloads: usize,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key: None,
            max_output_tokens: 2048,
            temperature: 0.2,
            max_concurrent_downloads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsSettings {
    pub endpoint: String,
    pub folder_id: Option<String>,
    pub token: Option<String>,
}

impl Default for DocumentsSettings {
    fn default() -> Self {
        Self { endpoint: "https://www.googleapis.com".to_string(), folder_id: None, token: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackSettings {
    pub bot_token: Option<String>,
    pub signing_secret: Option<String>,
    pub api_base: String,
    pub max_results: usize,
    pub result_chunk_size: usize,
    pub max_request_age_secs: u64,
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            signing_secret: None,
            api_base: "https://slack.com/api".to_string(),
            max_results: 5,
            result_chunk_size: 300,
            max_request_age_secs: 300,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
