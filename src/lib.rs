// src/lib.rs
// Public library surface for the CLI and integration tests.

pub mod aggregate;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod label;
pub mod pipeline;
pub mod prices;
pub mod sentiment;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::config::PipelineConfig;
pub use crate::error::PipelineError;
pub use crate::ingest::types::{RawItem, Source, TextField};
pub use crate::sentiment::{EnrichedItem, Sentiment};
