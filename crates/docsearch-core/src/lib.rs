#![deny(unused_variables)]

pub mod cancel;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod mime;
pub mod retry;
pub mod traits;
pub mod types;

pub use cancel::CancellationToken;
pub use error::{Error, Result, TransientKind};
pub use retry::{RetryPolicy, RetryState};
