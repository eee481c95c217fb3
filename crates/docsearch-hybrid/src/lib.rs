//! Hybrid retrieval and result ranking.
//!
//! Pure stages ([`fusion`], [`budget`], [`grouping`], [`ranking`]) are
//! synchronous; [`engine`] and [`model`] drive the remote collaborators and
//! [`service::SearchService`] is the single entry point callers use.

pub mod budget;
pub mod engine;
pub mod fusion;
pub mod grouping;
pub mod ingest;
pub mod model;
pub mod prompt;
pub mod ranking;
pub mod service;

pub use budget::{BudgetFilter, Scored};
pub use engine::HybridSearcher;
pub use fusion::{fuse, fuse_hybrid, RankedList};
pub use grouping::group_by_source;
pub use ingest::{IngestReport, Ingestor};
pub use model::ModelSearcher;
pub use service::{Components, Engine, SearchOptions, SearchService};
