//! View error types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Unknown sort direction: {0}")]
    UnknownDirection(String),
}

pub type ViewResult<T> = Result<T, ViewError>;
