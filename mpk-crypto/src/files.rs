//! Streaming whole-file encryption and decryption.
//!
//! Media files are large; these helpers process them through a fixed-size
//! buffer instead of loading them into memory.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::cipher::XorCipher;
use crate::header::{CryptoHeader, HEADER_SIZE};
use crate::{CryptoError, Result};

const FILE_BUFFER_SIZE: usize = 8 * 1024;

/// Encrypt `source` into `dest`: a 16-byte header recording the plaintext
/// size, followed by the XOR-masked content.
///
/// Returns the number of content bytes written (excluding the header).
pub fn encrypt_file(
    cipher: &XorCipher,
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
) -> Result<u64> {
    let source = source.as_ref();
    let dest = dest.as_ref();

    let file_size = std::fs::metadata(source)?.len();
    let mut reader = BufReader::new(File::open(source)?);
    let mut writer = BufWriter::new(File::create(dest)?);

    writer.write_all(&CryptoHeader::new(file_size).serialize())?;
    let written = apply_keystream(cipher, &mut reader, &mut writer, 0)?;
    writer.flush()?;

    debug!("encrypted {source:?} -> {dest:?} ({written} content bytes)");
    Ok(written)
}

/// Decrypt `source` into `dest`, validating and stripping the header.
///
/// A missing or invalid header is terminal for the call; nothing is written
/// to `dest` in that case. Returns the number of content bytes written.
pub fn decrypt_file(
    cipher: &XorCipher,
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
) -> Result<u64> {
    let source = source.as_ref();
    let dest = dest.as_ref();

    let mut reader = BufReader::new(File::open(source)?);
    let mut header_bytes = [0u8; HEADER_SIZE];
    let n = read_up_to(&mut reader, &mut header_bytes)?;
    if n < HEADER_SIZE {
        return Err(CryptoError::Truncated {
            expected: HEADER_SIZE,
            actual: n,
        });
    }
    let header = CryptoHeader::parse(&header_bytes)?;

    let mut writer = BufWriter::new(File::create(dest)?);
    let written = apply_keystream(cipher, &mut reader, &mut writer, 0)?;
    writer.flush()?;

    if written != header.original_size {
        warn!(
            "decrypted size {written} does not match header original size {}",
            header.original_size
        );
    }

    debug!("decrypted {source:?} -> {dest:?} ({written} content bytes)");
    Ok(written)
}

/// Pump `reader` into `writer` through the keystream, starting at
/// `content_offset`. XOR is symmetric, so this serves both directions.
fn apply_keystream(
    cipher: &XorCipher,
    reader: &mut impl Read,
    writer: &mut impl Write,
    mut content_offset: u64,
) -> Result<u64> {
    let mut buf = [0u8; FILE_BUFFER_SIZE];
    let start = content_offset;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        cipher.decrypt_in_place(&mut buf, 0, n, content_offset);
        writer.write_all(&buf[..n])?;
        content_offset += n as u64;
    }

    Ok(content_offset - start)
}

/// Read into `buf` until it is full or the reader hits EOF.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("clip.bin");
        let encrypted = dir.path().join("clip.enc");
        let decrypted = dir.path().join("clip.out");

        // Larger than the streaming buffer to exercise multiple chunks.
        let content: Vec<u8> = (0..40_000u32).map(|i| (i % 253) as u8).collect();
        std::fs::write(&plain, &content).unwrap();

        let cipher = XorCipher::new(&b"12345678"[..]).unwrap();
        let written = encrypt_file(&cipher, &plain, &encrypted).unwrap();
        assert_eq!(written, content.len() as u64);

        let on_disk = std::fs::read(&encrypted).unwrap();
        assert_eq!(on_disk.len(), HEADER_SIZE + content.len());
        let header = CryptoHeader::parse(&on_disk).unwrap();
        assert_eq!(header.original_size, content.len() as u64);
        assert_ne!(&on_disk[HEADER_SIZE..], &content[..]);

        decrypt_file(&cipher, &encrypted, &decrypted).unwrap();
        assert_eq!(std::fs::read(&decrypted).unwrap(), content);
    }

    #[test]
    fn test_decrypt_rejects_plain_file() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("not_encrypted.bin");
        let out = dir.path().join("out.bin");
        std::fs::write(&plain, vec![0u8; 64]).unwrap();

        let cipher = XorCipher::new(&b"key"[..]).unwrap();
        let err = decrypt_file(&cipher, &plain, &out).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidMagic(_)));
    }

    #[test]
    fn test_decrypt_rejects_short_file() {
        let dir = TempDir::new().unwrap();
        let short = dir.path().join("short.bin");
        let out = dir.path().join("out.bin");
        std::fs::write(&short, [0u8; 5]).unwrap();

        let cipher = XorCipher::new(&b"key"[..]).unwrap();
        let err = decrypt_file(&cipher, &short, &out).unwrap_err();
        assert!(matches!(err, CryptoError::Truncated { actual: 5, .. }));
    }
}
