use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use docsearch_core::config::{Config, SearchMode};
use docsearch_hybrid::Components;

/// Chunk, embed and index a directory of text documents.
#[derive(Parser, Debug)]
#[command(name = "docsearch-indexer")]
struct Args {
    /// Directory holding .txt/.md files (defaults to `data.raw_txt_dir`).
    #[arg(long)]
    input_dir: Option<PathBuf>,
    /// Also store the raw files under the documents prefix.
    #[arg(long)]
    upload: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();
    let config = Config::load().map_err(|e| {
        error!("Error loading config: {e}");
        e
    })?;
    let mut settings = config.settings()?;
    settings.search.mode = SearchMode::Hybrid;

    let data_dir = match args.input_dir {
        Some(dir) => dir,
        None => docsearch_core::config::expand_path(
            config.get::<String>("data.raw_txt_dir").unwrap_or_else(|_| "./dev_data/txt".to_string()),
        ),
    };
    info!("Indexing {} (upload: {})", data_dir.display(), args.upload);

    let components = Components::from_settings(&settings).context("building search components")?;
    let ingestor = components.ingestor();
    let report = ingestor.index_directory(&data_dir, args.upload).await?;

    info!("Indexing completed: generation {}, {} chunks", report.generation, report.total);
    println!("\n✅ Indexing completed successfully!");
    println!("\n💡 To search, use: cargo run --bin docsearch-search '<query>'");
    Ok(())
}
