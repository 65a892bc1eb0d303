//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Payload is not a tick batch at all; the whole message is dropped.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// One tuple inside an otherwise valid batch is unusable.
    #[error("Invalid tick at index {index}: {reason}")]
    InvalidTick { index: usize, reason: String },

    #[error("Store actor unavailable")]
    StoreClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;
