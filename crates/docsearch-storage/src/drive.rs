//! Document-management client over the Drive v3 REST API.
//!
//! Each request is retried here, so an upload never re-creates a file whose
//! permission step failed. Callers do not wrap these calls in another retry.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use docsearch_core::config::{require, DocumentsSettings};
use docsearch_core::error::{ensure_success, Error, Result};
use docsearch_core::retry::RetryPolicy;
use docsearch_core::traits::DocumentService;
use docsearch_core::types::{DocumentInfo, Meta, StoredDocument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const BOUNDARY: &str = "docsearch-upload-boundary-7f3a";
/// Drive rejects custom property values above this size.
const MAX_PROPERTY_BYTES: usize = 124;
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,webViewLink,properties)";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedFile {
    id: String,
    #[serde(default)]
    web_view_link: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    id: String,
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    web_view_link: String,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<FileEntry>,
    next_page_token: Option<String>,
}

impl From<FileEntry> for DocumentInfo {
    fn from(f: FileEntry) -> Self {
        Self { id: f.id, name: f.name, mime_type: f.mime_type, link: f.web_view_link, properties: f.properties }
    }
}

pub struct DriveClient {
    http: Client,
    base: Url,
    token: String,
    folder_id: Option<String>,
    retry: RetryPolicy,
}

impl DriveClient {
    pub fn new(settings: &DocumentsSettings, retry: RetryPolicy) -> Result<Self> {
        let token = require(&settings.token, "documents.token")?.to_string();
        let base = Url::parse(&settings.endpoint)
            .map_err(|e| Error::InvalidConfig(format!("documents.endpoint {}: {e}", settings.endpoint)))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { http, base, token, folder_id: settings.folder_id.clone(), retry })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidConfig(format!("documents.endpoint {} cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn create(&self, data: &[u8], name: &str, mime_type: &str, metadata: &Meta) -> Result<CreatedFile> {
        let mut file_meta = json!({ "name": name, "properties": to_properties(metadata) });
        if let Some(folder) = &self.folder_id {
            file_meta["parents"] = json!([folder]);
        }
        let body = multipart_related(&serde_json::to_vec(&file_meta)?, data, mime_type);
        let resp = self
            .http
            .post(self.url(&["upload", "drive", "v3", "files"])?)
            .query(&[("uploadType", "multipart"), ("fields", "id,webViewLink"), ("supportsAllDrives", "true")])
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, format!("multipart/related; boundary={BOUNDARY}"))
            .body(body)
            .send()
            .await?;
        Ok(ensure_success(resp).await?.json().await?)
    }

    async fn share_with_link(&self, id: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url(&["drive", "v3", "files", id, "permissions"])?)
            .bearer_auth(&self.token)
            .json(&json!({ "type": "anyone", "role": "reader" }))
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(self.url(&["drive", "v3", "files", id])?)
            .query(&[("alt", "media")])
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(ensure_success(resp).await?.bytes().await?.to_vec())
    }

    async fn list_page(&self, q: &str, page_token: Option<&str>) -> Result<FileList> {
        let mut req = self
            .http
            .get(self.url(&["drive", "v3", "files"])?)
            .query(&[("q", q), ("fields", LIST_FIELDS), ("supportsAllDrives", "true"), ("includeItemsFromAllDrives", "true")])
            .bearer_auth(&self.token);
        if let Some(t) = page_token {
            req = req.query(&[("pageToken", t)]);
        }
        Ok(ensure_success(req.send().await?).await?.json().await?)
    }

    async fn patch_properties(&self, id: &str, metadata: &Meta) -> Result<()> {
        let resp = self
            .http
            .patch(self.url(&["drive", "v3", "files", id])?)
            .query(&[("supportsAllDrives", "true")])
            .bearer_auth(&self.token)
            .json(&json!({ "properties": to_properties(metadata) }))
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&["drive", "v3", "files", id])?)
            .query(&[("supportsAllDrives", "true")])
            .bearer_auth(&self.token)
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }
}

/// Drive custom properties are flat strings of bounded size.
pub fn to_properties(metadata: &Meta) -> BTreeMap<String, String> {
    metadata
        .iter()
        .map(|(k, v)| {
            let s = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), truncate_bytes(&s, MAX_PROPERTY_BYTES.saturating_sub(k.len())).to_string())
        })
        .collect()
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub fn folder_query(folder: Option<&str>) -> String {
    match folder {
        Some(f) => format!("'{}' in parents and trashed = false", f.replace('\'', "\\'")),
        None => "trashed = false".to_string(),
    }
}

fn multipart_related(metadata_json: &[u8], data: &[u8], mime_type: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata_json.len() + data.len() + 256);
    body.extend_from_slice(format!("--{BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n").as_bytes());
    body.extend_from_slice(metadata_json);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

#[async_trait]
impl DocumentService for DriveClient {
    async fn upload(&self, data: Vec<u8>, name: &str, mime_type: &str, metadata: &Meta) -> Result<StoredDocument> {
        let created = self.retry.run("drive.create", || self.create(&data, name, mime_type, metadata)).await?;
        self.retry.run("drive.permission", || self.share_with_link(&created.id)).await?;
        info!("Uploaded {} to document service as {}", name, created.id);
        Ok(StoredDocument { id: created.id, link: created.web_view_link })
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>> {
        self.retry.run("drive.download", || self.fetch(id)).await
    }

    async fn list(&self, folder_filter: Option<&str>) -> Result<Vec<DocumentInfo>> {
        let q = folder_query(folder_filter.or(self.folder_id.as_deref()));
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.retry.run("drive.list", || self.list_page(&q, token.as_deref())).await?;
            out.extend(page.files.into_iter().map(DocumentInfo::from));
            match page.next_page_token {
                Some(t) if !t.is_empty() => token = Some(t),
                _ => break,
            }
        }
        Ok(out)
    }

    async fn update_metadata(&self, id: &str, metadata: &Meta) -> Result<()> {
        self.retry.run("drive.update", || self.patch_properties(id, metadata)).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        match self.retry.run("drive.delete", || self.remove(id)).await {
            Ok(()) => Ok(true),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                error!("Failed to delete document {}: {}", id, e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_are_strings_within_limit() {
        let mut meta = Meta::new();
        meta.insert("topics".into(), json!(["solar", "water"]));
        meta.insert("analysis".into(), json!("x".repeat(500)));
        let props = to_properties(&meta);
        assert_eq!(props["topics"], r#"["solar","water"]"#);
        assert_eq!(props["analysis"].len() + "analysis".len(), MAX_PROPERTY_BYTES);
    }

    #[test]
    fn folder_filter_query() {
        assert_eq!(folder_query(Some("abc")), "'abc' in parents and trashed = false");
        assert_eq!(folder_query(None), "trashed = false");
    }

    #[test]
    fn multipart_body_has_both_parts() {
        let body = multipart_related(br#"{"name":"a.txt"}"#, b"hello", "text/plain");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with(&format!("--{BOUNDARY}\r\n")));
        assert!(text.contains("Content-Type: text/plain\r\n\r\nhello\r\n"));
        assert!(text.ends_with(&format!("--{BOUNDARY}--\r\n")));
    }
}
