use axum::extract::{Multipart, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use docsearch_core::error::Error;
use docsearch_core::types::{FusedResult, Meta};
use docsearch_hybrid::SearchOptions;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub text: String,
    pub score: f32,
    pub metadata: Meta,
}

impl From<FusedResult> for SearchResult {
    fn from(r: FusedResult) -> Self {
        Self { text: r.text, score: r.score, metadata: r.metadata }
    }
}

pub async fn search(State(state): State<AppState>, Json(body): Json<SearchQuery>) -> Result<Json<Vec<SearchResult>>, ApiError> {
    let options = SearchOptions { top_k: body.top_k, ..Default::default() };
    // Dropping this future (client gone) drops the search with it.
    let response = state.search.search(&body.query, &options).await?;
    Ok(Json(response.into_iter().map(SearchResult::from).collect()))
}

pub async fn upload_document(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<Value>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| Error::InvalidInput(e.to_string()))? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|e| Error::InvalidInput(e.to_string()))?;
        let report = state.ingestor.ingest(&name, data.to_vec()).await?;
        info!("Ingested {} ({} chunks)", report.key, report.chunks);
        return Ok(Json(json!({
            "message": "document processed successfully",
            "key": report.key,
            "chunks": report.chunks,
        })));
    }
    Err(Error::InvalidInput("multipart field 'file' is required".into()).into())
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
