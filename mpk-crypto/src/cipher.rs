//! Position-addressable XOR keystream cipher.
//!
//! The keystream is the key repeated cyclically, so decrypting a byte at
//! content offset `k` only needs `key[k % key_len]`. Seek-then-read over an
//! encrypted stream therefore never has to process the bytes before the
//! window being read.

use crate::header::{CryptoHeader, HEADER_SIZE};
use crate::{CryptoError, Result};

/// XOR keystream cipher with a fixed key.
///
/// The key is never mutated after construction. Encryption and decryption
/// are the same operation; the direction only matters for the header
/// handling in [`encrypt`][Self::encrypt] and
/// [`decrypt_whole`][Self::decrypt_whole].
#[derive(Debug, Clone)]
pub struct XorCipher {
    key: Vec<u8>,
}

impl XorCipher {
    /// Create a cipher from a key. Fails on an empty key.
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(CryptoError::EmptyKey);
        }
        Ok(Self { key })
    }

    /// Key length in bytes.
    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    /// Encrypt `plaintext`, producing the 16-byte header followed by the
    /// XOR-masked content.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let header = CryptoHeader::new(plaintext.len() as u64);

        let mut out = Vec::with_capacity(HEADER_SIZE + plaintext.len());
        out.extend_from_slice(&header.serialize());
        out.extend(
            plaintext
                .iter()
                .enumerate()
                .map(|(i, b)| b ^ self.key[i % self.key.len()]),
        );
        out
    }

    /// Decrypt `data` as a window of the logical content starting at
    /// `content_offset`. Byte `i` is XORed with
    /// `key[(content_offset + i) % key_len]`.
    pub fn decrypt_at(&self, data: &[u8], content_offset: u64) -> Vec<u8> {
        let key_offset = (content_offset % self.key.len() as u64) as usize;
        data.iter()
            .enumerate()
            .map(|(i, b)| b ^ self.key[(key_offset + i) % self.key.len()])
            .collect()
    }

    /// Decrypt a complete encrypted blob that still carries its header.
    ///
    /// If `data` starts with a valid header it is stripped and the remainder
    /// decrypted from content offset 0. Inputs without a recognizable header
    /// are treated as raw ciphertext at offset 0; callers rely on this
    /// fallback for data that is ambiguous about being encrypted.
    pub fn decrypt_whole(&self, data: &[u8]) -> Vec<u8> {
        if CryptoHeader::sniff(data) {
            self.decrypt_at(&data[HEADER_SIZE..], 0)
        } else {
            self.decrypt_at(data, 0)
        }
    }

    /// Decrypt `data[start..start + len)` in place, for callers that must
    /// avoid an extra allocation. `len` is silently clamped so the range
    /// never exceeds the slice bounds.
    pub fn decrypt_in_place(
        &self,
        data: &mut [u8],
        start: usize,
        len: usize,
        content_offset: u64,
    ) {
        let key_offset = (content_offset % self.key.len() as u64) as usize;
        let start = start.min(data.len());
        let end = start.saturating_add(len).min(data.len());

        for (i, b) in data[start..end].iter_mut().enumerate() {
            *b ^= self.key[(key_offset + i) % self.key.len()];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(key: &[u8]) -> XorCipher {
        XorCipher::new(key).unwrap()
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            XorCipher::new(Vec::new()).unwrap_err(),
            CryptoError::EmptyKey
        ));
    }

    #[test]
    fn test_round_trip() {
        for key_len in [1usize, 8, 32] {
            let key: Vec<u8> = (0..key_len).map(|i| (i * 7 + 3) as u8).collect();
            let c = cipher(&key);

            for msg_len in [0usize, 1, 1000, 1_000_000] {
                let msg: Vec<u8> = (0..msg_len).map(|i| (i % 251) as u8).collect();
                let encrypted = c.encrypt(&msg);
                assert_eq!(encrypted.len(), HEADER_SIZE + msg.len());
                let decrypted = c.decrypt_at(&encrypted[HEADER_SIZE..], 0);
                assert_eq!(decrypted, msg, "key_len={key_len} msg_len={msg_len}");
            }
        }
    }

    #[test]
    fn test_empty_payload_is_header_only() {
        let c = cipher(b"key");
        let encrypted = c.encrypt(&[]);
        assert_eq!(encrypted.len(), HEADER_SIZE);
        assert!(c.decrypt_whole(&encrypted).is_empty());
    }

    #[test]
    fn test_keystream_formula() {
        // 100-byte payload, 8-byte key: ciphertext[i] = plaintext[i] ^ key[i % 8].
        let key = *b"abcdefgh";
        let c = cipher(&key);
        let plaintext: Vec<u8> = (0..100).map(|i| i as u8).collect();
        let encrypted = c.encrypt(&plaintext);

        for (i, p) in plaintext.iter().enumerate() {
            assert_eq!(encrypted[HEADER_SIZE + i], p ^ key[i % 8]);
        }

        let header = CryptoHeader::parse(&encrypted).unwrap();
        assert_eq!(header.version, 1);
        assert_eq!(header.original_size, 100);
    }

    #[test]
    fn test_position_independence() {
        let c = cipher(b"0123456789abc");
        let plaintext: Vec<u8> = (0..4096).map(|i| (i * 13 % 256) as u8).collect();
        let encrypted = c.encrypt(&plaintext);
        let content = &encrypted[HEADER_SIZE..];

        let whole = c.decrypt_at(content, 0);
        for (k, w) in [(0usize, 100usize), (1, 1), (17, 333), (4000, 96)] {
            let window = c.decrypt_at(&content[k..k + w], k as u64);
            assert_eq!(window, &whole[k..k + w], "k={k} w={w}");
        }
    }

    #[test]
    fn test_decrypt_whole_fallback() {
        let c = cipher(b"fallback");
        // No header at all: the entire input is raw ciphertext at offset 0.
        let raw: Vec<u8> = b"no header here, just bytes"
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ b"fallback"[i % 8])
            .collect();
        assert_eq!(c.decrypt_whole(&raw), b"no header here, just bytes");
    }

    #[test]
    fn test_decrypt_in_place_matches_decrypt_at() {
        let c = cipher(b"xyz");
        let mut data: Vec<u8> = (0u8..128).collect();
        let expected = c.decrypt_at(&data[32..96], 7);
        c.decrypt_in_place(&mut data, 32, 64, 7);
        assert_eq!(&data[32..96], &expected[..]);
    }

    #[test]
    fn test_decrypt_in_place_clamps_length() {
        let c = cipher(b"k");
        let mut data = vec![0xFFu8; 16];
        let snapshot = data.clone();
        // Range extends past the end: only the in-bounds bytes change.
        c.decrypt_in_place(&mut data, 8, 1000, 0);
        assert_ne!(&data[8..], &snapshot[8..]);
        assert_eq!(&data[..8], &snapshot[..8]);

        // Start past the end: no-op rather than a panic.
        c.decrypt_in_place(&mut data, 64, 4, 0);
    }
}
