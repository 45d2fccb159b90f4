//! Integration tests for [`LocalSource`] over plain and encrypted files.

use std::fs;

use tempfile::TempDir;

use mpk_crypto::XorCipher;
use mpk_source::{DataSource, LocalSource, SEEK_CUR, SEEK_END, SEEK_SET, SEEK_SIZE};

const KEY: &[u8] = b"local-test-key";

fn sample_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn read_to_end(source: &LocalSource) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let n = source.read_data(&mut buf);
        assert!(n >= 0, "read failed");
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n as usize]);
    }
    out
}

#[test]
fn plain_file_sequential_read() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plain.bin");
    let payload = sample_payload(1000);
    fs::write(&path, &payload).unwrap();

    let source = LocalSource::new(&path);
    assert!(source.init());
    assert_eq!(source.total_size(), 1000);
    assert_eq!(source.loaded_size(), 1000);

    assert_eq!(read_to_end(&source), payload);
    // At end of stream every further read reports zero bytes.
    let mut buf = [0u8; 16];
    assert_eq!(source.read_data(&mut buf), 0);
}

#[test]
fn encrypted_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.mp4");
    let payload = sample_payload(40_000);
    let cipher = XorCipher::new(KEY).unwrap();
    fs::write(&path, cipher.encrypt(&payload)).unwrap();

    let source = LocalSource::encrypted(&path, XorCipher::new(KEY).unwrap());
    assert!(source.init());
    // Header bytes are hidden from the reported sizes.
    assert_eq!(source.total_size(), 40_000);
    assert_eq!(source.loaded_size(), 40_000);

    assert_eq!(read_to_end(&source), payload);
}

#[test]
fn encrypted_seek_positions_are_content_relative() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.mp4");
    let payload = sample_payload(5000);
    let cipher = XorCipher::new(KEY).unwrap();
    fs::write(&path, cipher.encrypt(&payload)).unwrap();

    let source = LocalSource::encrypted(&path, XorCipher::new(KEY).unwrap());
    assert!(source.init());

    assert_eq!(source.seek(100, SEEK_SET), 100);
    let mut buf = [0u8; 50];
    assert_eq!(source.read_data(&mut buf), 50);
    assert_eq!(&buf[..], &payload[100..150]);

    // Relative seek from the position the read advanced to.
    assert_eq!(source.seek(-30, SEEK_CUR), 120);
    let mut buf = [0u8; 10];
    assert_eq!(source.read_data(&mut buf), 10);
    assert_eq!(&buf[..], &payload[120..130]);

    assert_eq!(source.seek(-10, SEEK_END), 4990);
    // Size query leaves the position untouched.
    assert_eq!(source.seek(0, SEEK_SIZE), 5000);
    let mut buf = [0u8; 10];
    assert_eq!(source.read_data(&mut buf), 10);
    assert_eq!(&buf[..], &payload[4990..]);
}

#[test]
fn seek_clamps_to_stream_bounds() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.mp4");
    let payload = sample_payload(1000);
    let cipher = XorCipher::new(KEY).unwrap();
    fs::write(&path, cipher.encrypt(&payload)).unwrap();

    let source = LocalSource::encrypted(&path, XorCipher::new(KEY).unwrap());
    assert!(source.init());

    // Before the content start clamps to zero, past the end clamps to the
    // stream length.
    assert_eq!(source.seek(-5, SEEK_SET), 0);
    assert_eq!(source.seek(10_000_000, SEEK_SET), 1000);
    assert_eq!(source.seek(0, SEEK_CUR), 1000);

    assert_eq!(source.seek(0, 42), -1);
}

#[test]
fn init_fails_for_missing_file() {
    let dir = TempDir::new().unwrap();
    let source = LocalSource::new(dir.path().join("absent.mp4"));
    assert!(!source.init());
    assert_eq!(source.total_size(), -1);
}

#[test]
fn init_rejects_unencrypted_file_when_key_given() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plain.mp4");
    fs::write(&path, sample_payload(100)).unwrap();

    let source = LocalSource::encrypted(&path, XorCipher::new(KEY).unwrap());
    assert!(!source.init());
}

#[test]
fn release_closes_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plain.bin");
    fs::write(&path, sample_payload(100)).unwrap();

    let source = LocalSource::new(&path);
    assert!(source.init());
    source.release();

    let mut buf = [0u8; 16];
    assert_eq!(source.read_data(&mut buf), 0);
    assert_eq!(source.seek(0, SEEK_SET), -1);
    assert_eq!(source.total_size(), -1);

    // Release twice is harmless.
    source.release();
}
