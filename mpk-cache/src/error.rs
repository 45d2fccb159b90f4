//! Error types for the mpk-cache crate

use thiserror::Error;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Error types for cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
