//! Item metadata retrieval and fetch deduplication.
//!
//! - `MetadataSource`: request/response seam to the metadata endpoint
//! - `MetadataClient`: HTTP implementation (`GET {base}/items?id=`)
//! - `FetchDeduplicator`: at most one in-flight request per id, concurrent
//!   batches with a per-request timeout

pub mod client;
pub mod dedup;
pub mod error;
pub mod source;

pub use client::MetadataClient;
pub use dedup::{DedupStats, FetchDeduplicator, PendingRequest, ResolveResults};
pub use error::{RegistryError, RegistryResult};
pub use source::{BoxFuture, DynMetadataSource, MetadataSource, MockFailure, MockMetadataSource};
