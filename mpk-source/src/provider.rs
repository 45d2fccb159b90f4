//! The data-provider contract consumed by the foreign player host.
//!
//! The host treats a source as an opaque supplier of bytes: it calls
//! [`DataSource::init`] once, then pulls with [`DataSource::read_data`] and
//! repositions with [`DataSource::seek`] until it calls
//! [`DataSource::stop`] and [`DataSource::release`]. Return conventions
//! follow the host's callback ABI: counts and positions, with 0 meaning
//! no data and negative values meaning failure.

/// Seek relative to the start of the content (header excluded).
pub const SEEK_SET: i32 = 0;

/// Seek relative to the current position.
pub const SEEK_CUR: i32 = 1;

/// Seek relative to the end of the resource.
pub const SEEK_END: i32 = 2;

/// Not a seek: query the content size without moving the position.
pub const SEEK_SIZE: i32 = 65536;

/// A byte source for the player host.
///
/// All methods take `&self`: the host serializes `read_data`/`seek`
/// between themselves, but `stop` and `release` may arrive from another
/// thread while a read is in flight and must be safe to run concurrently
/// with it.
pub trait DataSource: Send + Sync {
    /// Prepare the source for reading. Returns `false` when the source
    /// cannot be opened; the host will not call further operations then.
    fn init(&self) -> bool;

    /// Stop background activity. Non-blocking; an in-flight read observes
    /// the stop and returns promptly.
    fn stop(&self);

    /// Release all resources. Idempotent. Waits a bounded grace period for
    /// background work to finish, never indefinitely.
    fn release(&self);

    /// Fill `buf` with decrypted content bytes from the current position.
    ///
    /// Returns the number of bytes produced, `0` when no data is available
    /// (end of data, or not yet downloaded — the host retries), or a
    /// negative value on an IO failure.
    fn read_data(&self, buf: &mut [u8]) -> i32;

    /// Reposition the source, or query its size.
    ///
    /// `whence` is one of [`SEEK_SET`], [`SEEK_CUR`], [`SEEK_END`] or
    /// [`SEEK_SIZE`]. Returns the new content-relative position (or the
    /// content size for [`SEEK_SIZE`]), or `-1` on failure or when the
    /// required size is not yet known.
    fn seek(&self, offset: i64, whence: i32) -> i64;

    /// Total content size in bytes, `-1` while unknown.
    fn total_size(&self) -> i64;

    /// Content bytes available locally so far.
    fn loaded_size(&self) -> i64;
}
