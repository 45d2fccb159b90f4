//! The cache store: one resumable file per source URL, plus the shared
//! counters the downloader and reader coordinate through.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};
use url::Url;

use mpk_crypto::{CryptoHeader, HEADER_SIZE};

use crate::Result;

/// Marker embedded in a cache file name between the base name and the total
/// size in bytes, e.g. `clip_SIZE_1048576.mp4`.
const SIZE_MARKER: &str = "_SIZE_";

/// Extension given to cache files whose URL has none.
const DEFAULT_EXTENSION: &str = "mp4";

/// Resumable disk cache for a single media source.
///
/// The store tracks the active cache file plus three shared counters:
/// the remote total size (0 until known), the download frontier, and
/// whether the encrypted header at the start of the file has been verified.
/// All of them may be touched concurrently by the background downloader and
/// by the host's read/seek calls.
///
/// The active file path sits behind a lock and is swapped atomically when a
/// rename embeds the newly known size; readers always observe either the
/// old or the new identity, never a half-updated one.
pub struct CacheStore {
    cache_dir: PathBuf,
    active_file: RwLock<Option<PathBuf>>,

    /// Remote total size in bytes; 0 means not yet known.
    total_bytes: AtomicU64,
    /// Download frontier: bytes durably written to the active file.
    downloaded_bytes: AtomicU64,
    header_verified: AtomicBool,

    /// Generation counter bumped on every progress event, paired with the
    /// condvar so a waiting reader wakes as soon as new bytes land.
    progress: Mutex<u64>,
    progress_cv: Condvar,
}

impl CacheStore {
    /// Create a store rooted at `cache_dir`. The directory is created
    /// lazily on [`init_cache_file`][Self::init_cache_file].
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            active_file: RwLock::new(None),
            total_bytes: AtomicU64::new(0),
            downloaded_bytes: AtomicU64::new(0),
            header_verified: AtomicBool::new(false),
            progress: Mutex::new(0),
            progress_cv: Condvar::new(),
        }
    }

    /// The directory this store keeps its files in.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Initialize the cache file for `url`, resetting all counters.
    ///
    /// Scans the cache directory for a previous file for the same source:
    /// candidates must start with the URL's base name and keep its
    /// extension. A candidate whose name embeds a `_SIZE_<n>` suffix is
    /// adopted for resumption, recovering `total_bytes = n` and
    /// `downloaded_bytes = <file length>`. Candidates are visited in file
    /// name order and the first match wins.
    ///
    /// Without a resumable candidate a fresh, unsized file name is chosen
    /// (unless an active file is already set, which is kept).
    pub fn init_cache_file(&self, url: &str) -> Result<()> {
        self.total_bytes.store(0, Ordering::SeqCst);
        self.downloaded_bytes.store(0, Ordering::SeqCst);
        self.header_verified.store(false, Ordering::SeqCst);

        fs::create_dir_all(&self.cache_dir)?;

        let base_name = base_name_for_url(url);
        let (stem, extension) = split_extension(&base_name);

        let mut candidates: Vec<String> = fs::read_dir(&self.cache_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                name.starts_with(stem)
                    && extension.is_none_or(|ext| name.ends_with(ext))
            })
            .collect();
        candidates.sort();

        for name in candidates {
            let Some(size) = parse_size_suffix(&name) else {
                continue;
            };
            if size == 0 {
                continue;
            }

            let path = self.cache_dir.join(&name);
            let downloaded = fs::metadata(&path)?.len();
            *self.active_file.write() = Some(path);
            self.total_bytes.store(size, Ordering::SeqCst);
            self.downloaded_bytes.store(downloaded, Ordering::SeqCst);
            debug!("found resumable cache file {name}: total {size}, downloaded {downloaded}");
            return Ok(());
        }

        let mut active = self.active_file.write();
        if active.is_none() {
            let file_name = if extension.is_some() {
                base_name
            } else {
                format!("{base_name}.{DEFAULT_EXTENSION}")
            };
            debug!("starting fresh cache file {file_name}");
            *active = Some(self.cache_dir.join(file_name));
        }

        Ok(())
    }

    /// Path of the active cache file, if one is set.
    pub fn active_path(&self) -> Option<PathBuf> {
        self.active_file.read().clone()
    }

    /// Once the total size becomes known, rename the active file so its
    /// name embeds the size and a later run can resume it.
    ///
    /// Existing bytes are preserved by the rename. A file with no content
    /// yet simply adopts the new name. A name that already embeds a size is
    /// left alone.
    pub fn update_cache_file_name(&self, file_size: u64) -> Result<()> {
        let mut active = self.active_file.write();
        let Some(current) = active.as_ref() else {
            return Ok(());
        };

        let name = match current.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_owned(),
            None => return Ok(()),
        };
        if parse_size_suffix(&name).is_some() {
            return Ok(());
        }

        let (stem, extension) = split_extension(&name);
        let new_name = match extension {
            Some(ext) => format!("{stem}{SIZE_MARKER}{file_size}.{ext}"),
            None => format!("{stem}{SIZE_MARKER}{file_size}"),
        };
        let new_path = self.cache_dir.join(&new_name);

        let has_content = fs::metadata(current).map(|m| m.len() > 0).unwrap_or(false);
        if has_content {
            fs::rename(current, &new_path)?;
            debug!("renamed cache file to {new_name}");
        } else {
            debug!("adopted sized cache file name {new_name}");
        }

        *active = Some(new_path);
        Ok(())
    }

    /// Read and parse the first 16 bytes of the active file.
    ///
    /// Returns `None` when there is no active file, the file is shorter
    /// than a header, or the header does not parse.
    pub fn read_cached_header(&self) -> Option<CryptoHeader> {
        let path = self.active_path()?;
        let mut file = fs::File::open(&path).ok()?;
        let mut buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut buf).ok()?;

        match CryptoHeader::parse(&buf) {
            Ok(header) => Some(header),
            Err(e) => {
                warn!("cached header invalid: {e}");
                None
            }
        }
    }

    /// Delete the active cache file and clear the active reference.
    pub fn delete_cache_file(&self) {
        let mut active = self.active_file.write();
        if let Some(path) = active.take() {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    error!("failed to delete cache file {path:?}: {e}");
                }
            }
        }
    }

    /// Delete every file in the cache directory.
    pub fn clear_all_cache(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries.filter_map(|e| e.ok()) {
            if entry.file_type().is_ok_and(|t| t.is_file()) {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Remote total size in bytes; 0 until known.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::SeqCst)
    }

    /// Record the remote total size.
    pub fn set_total_bytes(&self, bytes: u64) {
        self.total_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Current download frontier.
    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes.load(Ordering::SeqCst)
    }

    /// Set the download frontier, e.g. when adopting a pre-existing file.
    pub fn set_downloaded_bytes(&self, bytes: u64) {
        self.downloaded_bytes.store(bytes, Ordering::SeqCst);
        self.notify_progress();
    }

    /// Advance the download frontier after a chunk is durably written and
    /// wake any reader waiting for data. Returns the new frontier.
    pub fn add_downloaded_bytes(&self, bytes: u64) -> u64 {
        let new = self.downloaded_bytes.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.notify_progress();
        new
    }

    /// Whether the encrypted header at the start of the file verified.
    pub fn is_header_verified(&self) -> bool {
        self.header_verified.load(Ordering::SeqCst)
    }

    /// Record header verification state.
    pub fn set_header_verified(&self, verified: bool) {
        self.header_verified.store(verified, Ordering::SeqCst);
    }

    /// Wake all waiters blocked in [`wait_for_progress`][Self::wait_for_progress].
    ///
    /// Called on every frontier advance, and by owners on stop so a blocked
    /// reader observes cancellation immediately instead of after a timeout.
    pub fn notify_progress(&self) {
        let mut generation = self.progress.lock();
        *generation += 1;
        self.progress_cv.notify_all();
    }

    /// Block until the next progress event or until `timeout` elapses.
    ///
    /// The caller re-checks its own conditions (frontier, stop flag) after
    /// every return; this is the bounded suspension point a network read
    /// parks on while it waits for the downloader to catch up.
    pub fn wait_for_progress(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut generation = self.progress.lock();
        let seen = *generation;

        while *generation == seen {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            if self
                .progress_cv
                .wait_for(&mut generation, deadline - now)
                .timed_out()
            {
                return;
            }
        }
    }
}

/// Derive the cache base name for a URL: its last path segment, or a hash
/// of the whole URL when there is none.
fn base_name_for_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_owned))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| {
            let digest = Sha256::digest(url.as_bytes());
            format!("cached_{}", hex::encode(&digest[..8]))
        })
}

/// Split a file name into stem and extension at the last dot.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

/// Extract the embedded total size from a `<base>_SIZE_<n><.ext>` name.
fn parse_size_suffix(name: &str) -> Option<u64> {
    let (stem, _) = split_extension(name);
    let (_, digits) = stem.rsplit_once(SIZE_MARKER)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
