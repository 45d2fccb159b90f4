//! Error types for the mpk-source crate

use thiserror::Error;

/// Result type for source operations
pub type Result<T> = std::result::Result<T, SourceError>;

/// Error types for source operations
#[derive(Debug, Error)]
pub enum SourceError {
    // Network errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status: {0}")]
    HttpStatus(reqwest::StatusCode),

    // File errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no active cache file")]
    NoCacheFile,

    // Component errors
    #[error("cache error: {0}")]
    Cache(#[from] mpk_cache::CacheError),
}
