//! Semantic retrieval: a flat inner-product index persisted as a blob next to
//! its chunk metadata in object storage.
pub mod flat;
pub mod index_build;
pub mod store;

pub use flat::FlatIndex;
pub use index_build::{BuildReport, IndexBuilder};
pub use store::{IndexSnapshot, IndexStore};
