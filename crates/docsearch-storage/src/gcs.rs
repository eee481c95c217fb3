//! Google Cloud Storage over its JSON API.
//!
//! Every call is a single HTTP request per page; callers own the retry policy.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use docsearch_core::config::{require, StorageSettings};
use docsearch_core::error::{ensure_success, Error, Result};
use docsearch_core::traits::ObjectStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    items: Vec<ObjectEntry>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectEntry {
    name: String,
}

pub struct GcsObjectStore {
    http: Client,
    base: Url,
    bucket: String,
    token: String,
}

impl GcsObjectStore {
    pub fn new(settings: &StorageSettings) -> Result<Self> {
        let bucket = require(&settings.bucket, "storage.bucket")?.to_string();
        let token = require(&settings.token, "storage.token")?.to_string();
        let base = Url::parse(&settings.endpoint)
            .map_err(|e| Error::InvalidConfig(format!("storage.endpoint {}: {e}", settings.endpoint)))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { http, base, bucket, token })
    }

    /// `{base}/{segments...}`, each segment percent-encoded (object names keep their `/`s encoded).
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidConfig(format!("storage.endpoint {} cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, key: &str) -> Result<Url> {
        self.url(&["storage", "v1", "b", &self.bucket, "o", key])
    }

    async fn put(&self, data: Vec<u8>, key: &str) -> Result<()> {
        let url = self.url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        let resp = self
            .http
            .post(url)
            .query(&[("uploadType", "media"), ("name", key)])
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(self.object_url(key)?)
            .query(&[("alt", "media")])
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(ensure_success(resp).await?.bytes().await?.to_vec())
    }

    async fn list_page(&self, prefix: &str, page_token: Option<&str>) -> Result<ListPage> {
        let mut req = self
            .http
            .get(self.url(&["storage", "v1", "b", &self.bucket, "o"])?)
            .query(&[("prefix", prefix), ("fields", "items(name),nextPageToken")])
            .bearer_auth(&self.token);
        if let Some(t) = page_token {
            req = req.query(&[("pageToken", t)]);
        }
        Ok(ensure_success(req.send().await?).await?.json().await?)
    }

    async fn head(&self, key: &str) -> Result<bool> {
        let resp = self.http.get(self.object_url(key)?).bearer_auth(&self.token).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(resp).await?;
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let resp = self.http.delete(self.object_url(key)?).bearer_auth(&self.token).send().await?;
        ensure_success(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;
        self.upload_bytes(data, key).await
    }

    async fn upload_bytes(&self, data: Vec<u8>, key: &str) -> Result<()> {
        debug!("gs://{}/{} <- {} bytes", self.bucket, key, data.len());
        self.put(data, key).await
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        self.get(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.list_page(prefix, token.as_deref()).await?;
            keys.extend(page.items.into_iter().map(|o| o.name));
            match page.next_page_token {
                Some(t) if !t.is_empty() => token = Some(t),
                _ => break,
            }
        }
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.head(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.remove(key).await
    }
}
