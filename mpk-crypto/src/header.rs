//! Encrypted-payload header parsing and serialization.
//!
//! Every encrypted media file starts with a fixed 16-byte header that marks
//! the payload as encrypted and records the original (plaintext) size.

use byteorder::{LittleEndian, ReadBytesExt};

use crate::{CryptoError, Result};

/// Header magic; serializes to the bytes `MGPK` in little-endian order.
pub const MAGIC: u32 = 0x4B50_474D;

/// Total header length in bytes.
pub const HEADER_SIZE: usize = 16;

/// Current format version written by [`CryptoHeader::new`].
pub const HEADER_VERSION: u32 = 1;

/// The 16-byte header prepended to every encrypted payload.
///
/// Wire layout, all words little-endian:
///
/// | offset | field           |
/// |--------|-----------------|
/// | 0      | magic (u32)     |
/// | 4      | version (u32)   |
/// | 8      | size, high u32  |
/// | 12     | size, low u32   |
///
/// The original size is stored as two 32-bit words with the **high** word
/// first; this order is part of the on-disk format and is not the same as a
/// little-endian u64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoHeader {
    /// Format version. Currently always [`HEADER_VERSION`], but any value
    /// present in a file round-trips unchanged.
    pub version: u32,

    /// Size of the plaintext payload in bytes.
    pub original_size: u64,
}

impl CryptoHeader {
    /// Create a header for a payload of `original_size` plaintext bytes.
    pub fn new(original_size: u64) -> Self {
        Self {
            version: HEADER_VERSION,
            original_size,
        }
    }

    /// Parse a header from the first [`HEADER_SIZE`] bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(CryptoError::Truncated {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut r = &data[..HEADER_SIZE];
        let magic = r.read_u32::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(CryptoError::InvalidMagic(magic));
        }

        let version = r.read_u32::<LittleEndian>()?;
        let high = r.read_u32::<LittleEndian>()?;
        let low = r.read_u32::<LittleEndian>()?;

        Ok(Self {
            version,
            original_size: (u64::from(high) << 32) | u64::from(low),
        })
    }

    /// Serialize the header to its 16-byte wire form. Exact inverse of
    /// [`parse`][Self::parse] for any `original_size`.
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&((self.original_size >> 32) as u32).to_le_bytes());
        buf[12..16].copy_from_slice(&(self.original_size as u32).to_le_bytes());
        buf
    }

    /// Cheap check whether `data` starts with the header magic.
    ///
    /// Used to sniff ambiguous inputs without committing to a full parse.
    pub fn sniff(data: &[u8]) -> bool {
        data.len() >= HEADER_SIZE && data[0..4] == MAGIC.to_le_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for size in [0, 1, 100, u64::from(u32::MAX), u64::MAX] {
            let header = CryptoHeader::new(size);
            let bytes = header.serialize();
            assert_eq!(bytes.len(), HEADER_SIZE);
            let parsed = CryptoHeader::parse(&bytes).unwrap();
            assert_eq!(parsed, header);
        }
    }

    #[test]
    fn test_magic_bytes() {
        let bytes = CryptoHeader::new(0).serialize();
        assert_eq!(&bytes[0..4], b"MGPK");
    }

    #[test]
    fn test_word_order() {
        // High word of the size is stored before the low word.
        let header = CryptoHeader::new(0x1122_3344_5566_7788);
        let bytes = header.serialize();
        assert_eq!(&bytes[8..12], &0x1122_3344u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &0x5566_7788u32.to_le_bytes());
    }

    #[test]
    fn test_version_round_trips_any_value() {
        let mut bytes = CryptoHeader::new(42).serialize();
        bytes[4..8].copy_from_slice(&7u32.to_le_bytes());
        let parsed = CryptoHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.version, 7);
        assert_eq!(parsed.original_size, 42);
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = CryptoHeader::new(10).serialize();
        bytes[0] = b'X';
        let err = CryptoHeader::parse(&bytes).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidMagic(_)));
    }

    #[test]
    fn test_truncated() {
        let bytes = CryptoHeader::new(10).serialize();
        let err = CryptoHeader::parse(&bytes[..15]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::Truncated {
                expected: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn test_sniff() {
        let bytes = CryptoHeader::new(10).serialize();
        assert!(CryptoHeader::sniff(&bytes));
        assert!(!CryptoHeader::sniff(&bytes[..15]));
        assert!(!CryptoHeader::sniff(b"not a header at all!"));
    }
}
