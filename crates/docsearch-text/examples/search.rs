use std::env;
use std::path::PathBuf;

use docsearch_core::data_processor::DataProcessor;
use docsearch_text::KeywordIndex;

// Rank the text chunks of a directory against a query with the keyword model alone.
// Usage:
//   cargo run -p docsearch-text --example search -- "your query" [--dir ./dev_data/txt] [--limit 10]

fn main() -> anyhow::Result<()> {
	let args: Vec<String> = env::args().skip(1).collect();
	if args.is_empty() {
		eprintln!("Usage: cargo run -p docsearch-text --example search -- <query> [--dir DIR] [--limit N]");
		std::process::exit(1);
	}
	let mut query = String::new();
	let mut data_dir = PathBuf::from("./dev_data/txt");
	let mut limit: usize = 10;

	let mut i = 0;
	while i < args.len() {
		match args[i].as_str() {
			"--dir" => {
				if i + 1 >= args.len() { eprintln!("--dir requires a path"); std::process::exit(2); }
				data_dir = PathBuf::from(&args[i + 1]);
				i += 2; continue;
			}
			"--limit" => {
				if i + 1 >= args.len() { eprintln!("--limit requires a number"); std::process::exit(2); }
				limit = args[i + 1].parse().unwrap_or(limit);
				i += 2; continue;
			}
			other => {
				if !query.is_empty() { query.push(' '); }
				query.push_str(other);
			}
		}
		i += 1;
	}

	let chunks = DataProcessor::default().process_directory(&data_dir)?;
	println!("Keyword search over {} chunks from {}", chunks.len(), data_dir.display());
	let index = KeywordIndex::new();
	for (rank, hit) in index.search(1, &chunks, &query, limit).iter().enumerate() {
		let chunk = &chunks[hit.index];
		let preview: String = chunk.text.chars().take(120).collect();
		println!("{:>2}. score={:.4}  id={}", rank + 1, hit.score, chunk.id);
		println!("    {}", preview.replace('\n', " "));
	}
	Ok(())
}
