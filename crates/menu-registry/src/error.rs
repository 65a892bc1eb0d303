//! Registry error types.

use menu_core::ItemId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Metadata not found for item {0}")]
    NotFound(ItemId),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Metadata fetch for item {id} timed out after {timeout_ms}ms")]
    Timeout { id: ItemId, timeout_ms: u64 },

    #[error("Unexpected payload: {0}")]
    UnexpectedPayload(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::HttpClient(_) | Self::HttpStatus { .. } => "http",
            Self::Timeout { .. } => "timeout",
            Self::UnexpectedPayload(_) | Self::Json(_) => "decode",
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
