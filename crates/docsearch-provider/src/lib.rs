//! Generative relevance provider, response repair and document analysis.
pub mod analysis;
pub mod gemini;
pub mod repair;

pub use analysis::{DocumentAnalysis, DocumentAnalyzer};
pub use gemini::GeminiProvider;
pub use repair::{parse_passages, ModelPassage};
