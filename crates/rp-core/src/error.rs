//! Error types shared by cursors and controllers

use arrow::error::ArrowError;
use thiserror::Error;

/// Errors raised by a remote cursor implementation
#[derive(Error, Debug, Clone)]
pub enum CursorError {
    #[error("Session is closed")]
    Closed,

    #[error("SQLite error: {0}")]
    Sqlite(String),

    #[error("Arrow error: {0}")]
    Arrow(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<ArrowError> for CursorError {
    fn from(error: ArrowError) -> Self {
        CursorError::Arrow(error.to_string())
    }
}

/// Errors surfaced to the consumer by the page controller and window cache
#[derive(Error, Debug, Clone)]
pub enum PagingError {
    #[error("Failed to open session: {0}")]
    SessionOpen(#[source] CursorError),

    #[error("Fetch failed: {0}")]
    Fetch(#[source] CursorError),

    #[error("Session reported itself closed")]
    StaleSession,

    #[error("No query installed")]
    NoQuery,

    #[error("Failed to start worker: {0}")]
    Worker(String),
}

/// Errors loading or saving paging settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}
