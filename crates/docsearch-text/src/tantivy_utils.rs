use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer, TokenStream};

/// Tokens longer than this are dropped before counting.
const MAX_TOKEN_LEN: usize = 40;

pub fn build_analyzer() -> TextAnalyzer {
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
		.filter(LowerCaser)
		.build()
}

/// Lowercased word tokens of `text`; single-character tokens are skipped.
pub fn tokenize(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
	let mut tokens = Vec::new();
	let mut stream = analyzer.token_stream(text);
	stream.process(&mut |token| {
		if token.text.chars().count() > 1 {
			tokens.push(token.text.clone());
		}
	});
	tokens
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lowercases_and_drops_single_chars() {
		let mut analyzer = build_analyzer();
		assert_eq!(tokenize(&mut analyzer, "The Quick, brown FOX; a b"), vec!["the", "quick", "brown", "fox"]);
	}
}
