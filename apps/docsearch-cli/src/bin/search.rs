use anyhow::Context;
use clap::Parser;
use tracing::info;

use docsearch_core::config::Config;
use docsearch_core::types::FILENAME_KEY;
use docsearch_hybrid::{Components, SearchOptions};

/// Query the configured search backend.
#[derive(Parser, Debug)]
#[command(name = "docsearch-search")]
struct Args {
    query: String,
    #[arg(long)]
    top_k: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();
    let args = Args::parse();
    let settings = Config::load()?.settings()?;
    let service = Components::from_settings(&settings)
        .and_then(|c| c.search_service())
        .context("building search service")?;

    info!("Searching for {:?} in {:?} mode", args.query, service.mode());
    let options = SearchOptions { top_k: args.top_k, ..Default::default() };
    let response = service.search(&args.query, &options).await?;

    println!("\n🔍 Found {} results for: \"{}\"", response.len(), args.query);
    for (i, result) in response.results.iter().enumerate() {
        let methods: Vec<&str> = result.found_by.iter().map(|m| m.as_str()).collect();
        println!(
            "\n  {}. score={:.4}  source={}  found_by={}",
            i + 1,
            result.score,
            result.source(FILENAME_KEY).unwrap_or("Unknown"),
            methods.join("+")
        );
        let preview: String = result.text.chars().take(200).collect();
        println!("     📝 {}", preview.replace('\n', " "));
        if let Some(explanation) = result.explanation() {
            println!("     💬 {explanation}");
        }
    }
    Ok(())
}
