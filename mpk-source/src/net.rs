//! Data source over a remote resource, cached to disk.
//!
//! A [`NetworkSource`] couples three actors around one [`CacheStore`]:
//! the background downloader filling the cache file front to back, the
//! host pulling decrypted bytes out of it, and the host's seeks, which may
//! jump ahead of the download frontier. Reads past the frontier park on
//! the store's progress signal in bounded intervals; seeks never block.

use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use tokio::runtime::Runtime;
use tracing::{debug, error, warn};

use mpk_cache::CacheStore;
use mpk_crypto::{HEADER_SIZE, XorCipher};

use crate::downloader::Downloader;
use crate::provider::{DataSource, SEEK_CUR, SEEK_END, SEEK_SET, SEEK_SIZE};
use crate::{Result, SourceError};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval at which a waiting read re-checks the stop flag; cancellation
/// is observed within one interval.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `release` waits for the downloader before forcing cancellation.
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Configuration for a [`NetworkSource`].
#[derive(Debug, Clone)]
pub struct NetworkSourceConfig {
    /// Directory holding the resumable cache files.
    pub cache_dir: PathBuf,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// HTTP read timeout between body chunks.
    pub read_timeout: Duration,
    /// Bounded wait interval for reads past the download frontier.
    pub poll_interval: Duration,
    /// Grace period `release` grants the background task.
    pub shutdown_grace: Duration,
}

impl NetworkSourceConfig {
    /// Default timeouts with cache files kept in `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl Default for NetworkSourceConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("media_cache"))
    }
}

/// Flags shared between the source and its background download task.
pub(crate) struct SourceFlags {
    /// Guard ensuring at most one download task is in flight; checked and
    /// set atomically on start, cleared when the task exits.
    pub(crate) is_downloading: AtomicBool,
    pub(crate) is_stopped: AtomicBool,
}

/// A [`DataSource`] streaming a remote resource through a resumable disk
/// cache.
///
/// The source owns a single-worker runtime for its background download
/// task, mirroring the one-task-at-a-time download model: `init` starts
/// the task, `stop` signals it to exit at the next chunk boundary, and
/// `release` shuts the runtime down with a bounded grace period. A failed
/// download attempt leaves the instance idle but recoverable; a later seek
/// or read that needs more data re-triggers a fresh attempt.
pub struct NetworkSource {
    url: String,
    cipher: Option<XorCipher>,
    config: NetworkSourceConfig,
    store: Arc<CacheStore>,
    flags: Arc<SourceFlags>,
    /// Absolute read position, header bytes included.
    current_position: AtomicU64,
    client: Mutex<Option<Client>>,
    runtime: Mutex<Option<Runtime>>,
}

impl NetworkSource {
    /// Create a source for `url`. Pass a cipher when the remote payload is
    /// encrypted; `None` streams it through unchanged.
    pub fn new(
        url: impl Into<String>,
        cipher: Option<XorCipher>,
        config: NetworkSourceConfig,
    ) -> Self {
        let store = Arc::new(CacheStore::new(&config.cache_dir));
        Self {
            url: url.into(),
            cipher,
            config,
            store,
            flags: Arc::new(SourceFlags {
                is_downloading: AtomicBool::new(false),
                is_stopped: AtomicBool::new(false),
            }),
            current_position: AtomicU64::new(0),
            client: Mutex::new(None),
            runtime: Mutex::new(None),
        }
    }

    /// The cache store backing this source.
    pub fn cache_store(&self) -> Arc<CacheStore> {
        Arc::clone(&self.store)
    }

    fn header_size(&self) -> u64 {
        if self.cipher.is_some() {
            HEADER_SIZE as u64
        } else {
            0
        }
    }

    fn position(&self) -> u64 {
        self.current_position.load(Ordering::SeqCst)
    }

    fn ensure_runtime(&self) -> bool {
        let mut runtime = self.runtime.lock();
        if runtime.is_none() {
            match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("mpk-downloader")
                .enable_all()
                .build()
            {
                Ok(rt) => *runtime = Some(rt),
                Err(e) => {
                    error!("failed to start downloader runtime: {e}");
                    return false;
                }
            }
        }
        true
    }

    fn ensure_client(&self) -> bool {
        let mut client = self.client.lock();
        if client.is_none() {
            match Client::builder()
                .connect_timeout(self.config.connect_timeout)
                .read_timeout(self.config.read_timeout)
                .build()
            {
                Ok(c) => *client = Some(c),
                Err(e) => {
                    error!("failed to build HTTP client: {e}");
                    return false;
                }
            }
        }
        true
    }

    /// Start the background download task unless one is already in flight
    /// or the source is stopped.
    pub(crate) fn start_download(&self) {
        if self.flags.is_stopped.load(Ordering::SeqCst) {
            return;
        }
        if self.flags.is_downloading.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("starting download: {}", self.url);

        let client = self.client.lock().clone();
        let Some(client) = client else {
            self.flags.is_downloading.store(false, Ordering::SeqCst);
            return;
        };
        let runtime = self.runtime.lock();
        let Some(runtime) = runtime.as_ref() else {
            self.flags.is_downloading.store(false, Ordering::SeqCst);
            return;
        };

        let downloader = Downloader {
            url: self.url.clone(),
            client,
            store: Arc::clone(&self.store),
            flags: Arc::clone(&self.flags),
            encrypted: self.cipher.is_some(),
        };
        let flags = Arc::clone(&self.flags);
        let store = Arc::clone(&self.store);

        runtime.spawn(async move {
            if let Err(e) = downloader.run().await {
                // Recoverable: on-disk bytes stay consistent, a later seek
                // or read re-triggers a fresh attempt.
                warn!("download attempt failed: {e}");
            }
            flags.is_downloading.store(false, Ordering::SeqCst);
            store.notify_progress();
        });
    }

    fn read_from_cache(&self, buf: &mut [u8], want: usize, position: u64) -> Result<usize> {
        let path = self.store.active_path().ok_or(SourceError::NoCacheFile)?;
        let mut file = std::fs::File::open(&path)?;
        file.seek(SeekFrom::Start(position))?;

        let n = file.read(&mut buf[..want])?;
        if n > 0 {
            if let Some(cipher) = &self.cipher {
                let content_offset = position.saturating_sub(self.header_size());
                cipher.decrypt_in_place(buf, 0, n, content_offset);
            }
            self.current_position
                .store(position + n as u64, Ordering::SeqCst);
        }
        Ok(n)
    }
}

impl DataSource for NetworkSource {
    fn init(&self) -> bool {
        self.flags.is_stopped.store(false, Ordering::SeqCst);
        self.current_position
            .store(self.header_size(), Ordering::SeqCst);

        if !self.ensure_runtime() || !self.ensure_client() {
            return false;
        }

        if let Err(e) = self.store.init_cache_file(&self.url) {
            error!("failed to initialize cache file: {e}");
            return false;
        }

        // Adopt whatever the cache file already holds, and verify its
        // header right away when it is long enough.
        if let Some(path) = self.store.active_path() {
            if let Ok(metadata) = std::fs::metadata(&path) {
                let cached = metadata.len();
                self.store.set_downloaded_bytes(cached);
                if self.cipher.is_some() && cached >= HEADER_SIZE as u64 {
                    if let Some(header) = self.store.read_cached_header() {
                        self.store.set_header_verified(true);
                        debug!("cache header verified, original size {}", header.original_size);
                    }
                }
            }
        }

        self.start_download();
        true
    }

    fn stop(&self) {
        self.flags.is_stopped.store(true, Ordering::SeqCst);
        self.flags.is_downloading.store(false, Ordering::SeqCst);
        // Wake any read parked on the progress signal.
        self.store.notify_progress();
    }

    fn release(&self) {
        self.flags.is_stopped.store(true, Ordering::SeqCst);
        self.store.notify_progress();

        let runtime = self.runtime.lock().take();
        if let Some(runtime) = runtime {
            // Bounded join: the download loop exits at its next chunk
            // boundary; anything slower gets cancelled.
            runtime.shutdown_timeout(self.config.shutdown_grace);
        }
    }

    fn read_data(&self, buf: &mut [u8]) -> i32 {
        if self.flags.is_stopped.load(Ordering::SeqCst) {
            return 0;
        }

        // Suspension point: wait while the requested window extends past
        // the download frontier and a download is still in flight. Each
        // wakeup re-checks the stop flag.
        let want = buf.len() as u64;
        while self.position() + want >= self.store.downloaded_bytes()
            && self.flags.is_downloading.load(Ordering::SeqCst)
            && !self.flags.is_stopped.load(Ordering::SeqCst)
        {
            self.store.wait_for_progress(self.config.poll_interval);
        }

        if self.flags.is_stopped.load(Ordering::SeqCst) {
            return 0;
        }

        let position = self.position();
        let available = self.store.downloaded_bytes().saturating_sub(position);
        if available == 0 {
            // More data is needed but no download is in flight: a failed
            // attempt left the instance idle, so trigger a fresh one. Not
            // at end of stream, where there is nothing left to fetch.
            let total = self.store.total_bytes();
            if !self.flags.is_downloading.load(Ordering::SeqCst) && (total == 0 || position < total)
            {
                self.start_download();
            }
            // Insufficient data; the host retries.
            return 0;
        }
        let want = want.min(available) as usize;

        match self.read_from_cache(buf, want, position) {
            Ok(n) => n as i32,
            Err(e) => {
                error!("error reading cached data: {e}");
                -1
            }
        }
    }

    fn seek(&self, offset: i64, whence: i32) -> i64 {
        if self.flags.is_stopped.load(Ordering::SeqCst) {
            return -1;
        }
        debug!("seek: offset={offset}, whence={whence}");

        let header_size = self.header_size() as i64;
        let total = self.store.total_bytes() as i64; // 0 = unknown

        let absolute = match whence {
            SEEK_SET => header_size + offset,
            SEEK_CUR => self.position() as i64 + offset,
            SEEK_END => {
                if total <= 0 {
                    return -1;
                }
                total + offset
            }
            SEEK_SIZE => {
                return if total > 0 { total - header_size } else { -1 };
            }
            _ => {
                warn!("unknown seek whence: {whence}");
                return -1;
            }
        };

        let clamped = if absolute < header_size {
            header_size
        } else if total > 0 && absolute > total {
            total
        } else {
            absolute
        } as u64;

        // A seek past the frontier restarts an idle downloader. The seek
        // itself never blocks; the following read performs any wait.
        if clamped > self.store.downloaded_bytes()
            && !self.flags.is_downloading.load(Ordering::SeqCst)
        {
            self.start_download();
        }

        self.current_position.store(clamped, Ordering::SeqCst);
        clamped as i64 - header_size
    }

    fn total_size(&self) -> i64 {
        let total = self.store.total_bytes();
        if total == 0 {
            return -1;
        }
        total.saturating_sub(self.header_size()) as i64
    }

    fn loaded_size(&self) -> i64 {
        self.store
            .downloaded_bytes()
            .saturating_sub(self.header_size()) as i64
    }
}

impl Drop for NetworkSource {
    fn drop(&mut self) {
        // A runtime must not be dropped from async context; hand it the
        // bounded shutdown it would have received from release().
        let runtime = self.runtime.lock().take();
        if let Some(runtime) = runtime {
            self.flags.is_stopped.store(true, Ordering::SeqCst);
            self.store.notify_progress();
            runtime.shutdown_timeout(self.config.shutdown_grace);
        }
    }
}
