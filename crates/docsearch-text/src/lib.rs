//! docsearch-text
//!
//! Keyword relevance over the chunk corpus: a tantivy analyzer feeding an
//! in-process TF-IDF model, cached per corpus generation.
pub mod tantivy_utils;
pub mod tfidf;
pub mod index;

pub use index::KeywordIndex;
pub use tfidf::TfIdfModel;
