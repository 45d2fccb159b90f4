//! Background download task feeding the cache file.
//!
//! One task runs at a time. It probes the remote size first, reconciles
//! the cache file against it, then streams the remainder with a range
//! request starting at the current frontier. Every chunk lands in the
//! file before the frontier counter moves, so the counter never claims
//! bytes a concurrent read cannot see.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode, header};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use mpk_cache::CacheStore;
use mpk_crypto::HEADER_SIZE;

use crate::net::SourceFlags;
use crate::{Result, SourceError};

pub(crate) struct Downloader {
    pub(crate) url: String,
    pub(crate) client: Client,
    pub(crate) store: Arc<CacheStore>,
    pub(crate) flags: Arc<SourceFlags>,
    pub(crate) encrypted: bool,
}

impl Downloader {
    /// One download attempt: refresh the remote size, then stream from the
    /// current frontier to the end. Completes early when the cache already
    /// holds the full resource.
    pub(crate) async fn run(&self) -> Result<()> {
        self.refresh_remote_size().await?;

        if self.flags.is_stopped.load(Ordering::SeqCst) {
            return Ok(());
        }

        let total = self.store.total_bytes();
        let downloaded = self.store.downloaded_bytes();
        if total > 0 && downloaded >= total {
            debug!("cache already complete ({downloaded} bytes)");
            return Ok(());
        }

        self.download_from(downloaded).await
    }

    /// Probe the remote resource and reconcile the cache file with its
    /// size. A size that contradicts a previously known total means the
    /// resource changed; the stale cache file is discarded and the
    /// download restarts from zero.
    async fn refresh_remote_size(&self) -> Result<()> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(SourceError::HttpStatus(status));
        }

        let Some(len) = response.content_length() else {
            return Ok(());
        };
        if len == 0 {
            return Ok(());
        }

        let total = self.store.total_bytes();
        if total == 0 {
            self.store.set_total_bytes(len);
            self.store.update_cache_file_name(len)?;
            debug!("remote size: {len} bytes");
        } else if len != total {
            warn!("remote size changed ({total} -> {len}), discarding cache");
            self.store.delete_cache_file();
            self.store.init_cache_file(&self.url)?;
            self.store.update_cache_file_name(len)?;
            self.store.set_total_bytes(len);
        }
        Ok(())
    }

    async fn download_from(&self, start: u64) -> Result<()> {
        let path = self.store.active_path().ok_or(SourceError::NoCacheFile)?;

        let mut file = if start > 0 {
            OpenOptions::new().append(true).open(&path).await?
        } else {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)
                .await?
        };

        let mut request = self.client.get(&self.url);
        if start > 0 {
            request = request.header(header::RANGE, format!("bytes={start}-"));
        }
        let response = request.send().await?;
        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                debug!("resuming download from byte {start}");
            }
            StatusCode::OK => {
                if start > 0 {
                    // Server ignored the range request and is sending the
                    // whole resource; restart the cache file from zero.
                    warn!("server does not support resume, restarting download");
                    file.set_len(0).await?;
                    self.store.set_downloaded_bytes(0);
                }
            }
            status => return Err(SourceError::HttpStatus(status)),
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if self.flags.is_stopped.load(Ordering::SeqCst) {
                debug!("download stopped");
                break;
            }
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            // The file buffers internally; the frontier must not move until
            // the bytes are visible to a concurrent reader.
            file.flush().await?;

            let frontier = self.store.add_downloaded_bytes(chunk.len() as u64);
            trace!("downloaded {frontier}/{} bytes", self.store.total_bytes());

            if self.encrypted
                && !self.store.is_header_verified()
                && frontier >= HEADER_SIZE as u64
                && self.store.read_cached_header().is_some()
            {
                self.store.set_header_verified(true);
                debug!("cached payload header verified");
            }
        }
        Ok(())
    }
}
