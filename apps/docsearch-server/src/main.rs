use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use docsearch_core::config::Config;
use docsearch_core::retry::RetryPolicy;
use docsearch_hybrid::Components;
use docsearch_server::slack::SlackClient;
use docsearch_server::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::load().context("loading configuration")?;
    let settings = config.settings()?;
    info!("Starting docsearch server (env: {})", config.env_name());

    let components = Components::from_settings(&settings).context("building search components")?;
    let slack_client = match settings.slack.bot_token {
        Some(_) => Some(Arc::new(SlackClient::new(&settings.slack, RetryPolicy::from(&settings.retry))?)),
        None => {
            warn!("slack.bot_token not set; Slack mentions will not be answered");
            None
        }
    };
    let state = AppState {
        search: Arc::new(components.search_service()?),
        ingestor: Arc::new(components.ingestor()),
        slack: Arc::new(settings.slack.clone()),
        slack_client,
    };

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    info!("Listening on {addr}");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
