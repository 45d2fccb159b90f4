//! Error types for the mpk-crypto crate

use thiserror::Error;

/// Error types for header parsing and cipher operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The header magic did not match the expected constant
    #[error("invalid header magic: {0:#010x}")]
    InvalidMagic(u32),

    /// Fewer bytes were available than a full header needs
    #[error("truncated header: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// The cipher key was empty
    #[error("encryption key must not be empty")]
    EmptyKey,

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
