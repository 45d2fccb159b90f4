//! Encryption support for protected media payloads.
//!
//! This crate provides:
//! - The fixed 16-byte header that marks a payload as encrypted
//! - A position-addressable XOR keystream cipher, so any byte window of the
//!   payload can be decrypted knowing only its content offset
//! - Streaming whole-file encryption and decryption helpers
//!
//! The cipher is deliberately not a security primitive: it obscures media
//! content against casual copying, nothing more.

pub mod cipher;
pub mod error;
pub mod files;
pub mod header;

pub use cipher::XorCipher;
pub use error::CryptoError;
pub use header::{CryptoHeader, HEADER_SIZE, MAGIC};

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
