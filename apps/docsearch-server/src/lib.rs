//! HTTP API and Slack webhooks over a shared [`SearchService`].

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use docsearch_core::config::SlackSettings;
use docsearch_hybrid::{Ingestor, SearchService};

pub mod error;
pub mod routes;
pub mod slack;

use slack::SlackClient;

/// Multipart framing on top of the document itself.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
    pub ingestor: Arc<Ingestor>,
    pub slack: Arc<SlackSettings>,
    pub slack_client: Option<Arc<SlackClient>>,
}

pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.ingestor.max_document_bytes().saturating_add(UPLOAD_OVERHEAD_BYTES);
    Router::new()
        .route("/search", post(routes::search))
        .route("/documents", post(routes::upload_document).layer(DefaultBodyLimit::max(upload_limit)))
        .route("/health", get(routes::health))
        .route("/slack/events", post(slack::handle_events))
        .route("/slack/commands", post(slack::handle_commands))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
