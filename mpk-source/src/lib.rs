//! Data sources that feed decrypted media bytes to a player host.
//!
//! The host drives a source through the [`DataSource`] contract: `init`,
//! then repeated `read_data`/`seek` calls, then `stop`/`release`. Two
//! implementations are provided:
//!
//! - [`LocalSource`] reads a local, optionally encrypted file.
//! - [`NetworkSource`] streams a remote resource through a resumable disk
//!   cache, downloading in the background while the host pulls decrypted
//!   bytes, possibly ahead of what has been downloaded.
//!
//! Read calls on a [`NetworkSource`] are the only blocking operation: a
//! read past the download frontier parks on the cache's progress signal in
//! bounded intervals, re-checking the stop flag each time, so cancellation
//! is always observed within one interval.

pub mod error;
pub mod local;
pub mod net;
pub mod provider;

mod downloader;

pub use error::{Result, SourceError};
pub use local::LocalSource;
pub use net::{NetworkSource, NetworkSourceConfig};
pub use provider::{DataSource, SEEK_CUR, SEEK_END, SEEK_SET, SEEK_SIZE};
