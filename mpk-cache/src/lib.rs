//! Resumable on-disk cache for remote media files.
//!
//! Each source URL maps to one cache file. The file name optionally embeds
//! the remote resource's total size (`<base>_SIZE_<bytes><.ext>`), which is
//! how a partially downloaded file is recognized and resumed after a
//! process restart: the suffix recovers the total, the file length recovers
//! the download frontier.
//!
//! The cache is unbounded by design; eviction is explicit
//! ([`CacheStore::delete_cache_file`] / [`CacheStore::clear_all_cache`]).

pub mod error;
pub mod store;

pub use error::{CacheError, Result};
pub use store::CacheStore;
