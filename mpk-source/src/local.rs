//! Data source over a local, optionally encrypted file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use mpk_crypto::{CryptoHeader, HEADER_SIZE, XorCipher};

use crate::provider::{DataSource, SEEK_CUR, SEEK_END, SEEK_SET, SEEK_SIZE};

/// A [`DataSource`] reading a file on disk.
///
/// For encrypted files the 16-byte header is validated on
/// [`init`][DataSource::init] and hidden from the host: positions and
/// sizes reported outward are content-relative, and reads decrypt in place
/// using the position-addressable keystream. The whole file is always
/// immediately available, so `total_size` and `loaded_size` agree and
/// [`stop`][DataSource::stop] has nothing to do.
pub struct LocalSource {
    path: PathBuf,
    cipher: Option<XorCipher>,
    state: Mutex<LocalState>,
}

#[derive(Default)]
struct LocalState {
    file: Option<File>,
    file_size: u64,
    /// Absolute position in the file, header included.
    position: u64,
}

impl LocalSource {
    /// Source over a plain, unencrypted file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cipher: None,
            state: Mutex::new(LocalState::default()),
        }
    }

    /// Source over an encrypted file; `cipher` must hold the key the file
    /// was encrypted with.
    pub fn encrypted(path: impl Into<PathBuf>, cipher: XorCipher) -> Self {
        Self {
            path: path.into(),
            cipher: Some(cipher),
            state: Mutex::new(LocalState::default()),
        }
    }

    fn header_size(&self) -> u64 {
        if self.cipher.is_some() {
            HEADER_SIZE as u64
        } else {
            0
        }
    }
}

impl DataSource for LocalSource {
    fn init(&self) -> bool {
        let mut state = self.state.lock();

        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                error!("failed to open {:?}: {e}", self.path);
                return false;
            }
        };
        let file_size = match file.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                error!("failed to stat {:?}: {e}", self.path);
                return false;
            }
        };

        let mut position = 0;
        if self.cipher.is_some() {
            // Header validation failure is terminal for this open.
            let mut header_bytes = [0u8; HEADER_SIZE];
            if let Err(e) = file.read_exact(&mut header_bytes) {
                error!("failed to read header from {:?}: {e}", self.path);
                return false;
            }
            match CryptoHeader::parse(&header_bytes) {
                Ok(header) => {
                    debug!("file header verified: original size {}", header.original_size);
                }
                Err(e) => {
                    error!("invalid encrypted file header in {:?}: {e}", self.path);
                    return false;
                }
            }
            // Stream now sits just past the header.
            position = HEADER_SIZE as u64;
        }

        state.file = Some(file);
        state.file_size = file_size;
        state.position = position;
        debug!("opened {:?}, size {file_size}", self.path);
        true
    }

    fn stop(&self) {
        // No background activity for local files.
    }

    fn release(&self) {
        self.state.lock().file = None;
    }

    fn read_data(&self, buf: &mut [u8]) -> i32 {
        let mut state = self.state.lock();
        let header_size = self.header_size();

        let remaining = state.file_size.saturating_sub(state.position);
        let want = (buf.len() as u64).min(remaining) as usize;
        if want == 0 {
            return 0;
        }
        let position = state.position;

        let Some(file) = state.file.as_mut() else {
            return 0;
        };
        match file.read(&mut buf[..want]) {
            Ok(0) => 0,
            Ok(n) => {
                state.position += n as u64;
                if let Some(cipher) = &self.cipher {
                    let content_offset = position - header_size;
                    cipher.decrypt_in_place(buf, 0, n, content_offset);
                }
                n as i32
            }
            Err(e) => {
                error!("read failed on {:?}: {e}", self.path);
                -1
            }
        }
    }

    fn seek(&self, offset: i64, whence: i32) -> i64 {
        let mut state = self.state.lock();
        if state.file.is_none() {
            return -1;
        }

        let header_size = self.header_size() as i64;
        let file_size = state.file_size as i64;

        let absolute = match whence {
            SEEK_SET => header_size + offset,
            SEEK_CUR => state.position as i64 + offset,
            SEEK_END => file_size + offset,
            SEEK_SIZE => return file_size - header_size,
            _ => {
                warn!("unknown seek whence: {whence}");
                return -1;
            }
        };

        let clamped = absolute.clamp(header_size, file_size) as u64;

        let Some(file) = state.file.as_mut() else {
            return -1;
        };
        if let Err(e) = file.seek(SeekFrom::Start(clamped)) {
            error!("seek failed on {:?}: {e}", self.path);
            return -1;
        }
        state.position = clamped;

        clamped as i64 - header_size
    }

    fn total_size(&self) -> i64 {
        let state = self.state.lock();
        if state.file.is_none() {
            return -1;
        }
        state.file_size.saturating_sub(self.header_size()) as i64
    }

    fn loaded_size(&self) -> i64 {
        // Local files are always fully available.
        self.total_size()
    }
}
