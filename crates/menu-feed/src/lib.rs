//! Push-channel ingestion and the view-model store.
//!
//! Ticks flow through `StreamIngestor`, which consults the freshness ledger
//! to decide between a direct price merge and a metadata fetch. Resolved
//! metadata and prices meet in `ViewModelStore`, the authoritative table.

pub mod error;
pub mod ingestor;
pub mod ledger;
pub mod parser;
pub mod store;

pub use error::{FeedError, FeedResult};
pub use ingestor::{
    CompletionReport, IngestConfig, IngestReport, IngestStats, IngestStatsSnapshot, StreamIngestor,
};
pub use ledger::FreshnessLedger;
pub use parser::{ParsedBatch, TickParser};
pub use store::{MetadataOutcome, StoreSnapshot, TickOutcome, ViewModelStore};
