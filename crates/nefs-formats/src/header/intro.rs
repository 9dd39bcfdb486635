//! The 128-byte header intro

use binrw::{BinRead, BinWrite, Endian};
use nefs_crypto::{AesKey, Sha256Hash};

use super::NEFS_MAGIC;
use crate::NefsResult;
use crate::toc::TocRecord;

/// Size of the intro block
pub const INTRO_SIZE: usize = 128;

/// Offset of the stored header hash
pub const HASH_OFFSET: usize = 0x04;

/// First byte after the stored header hash
pub const HASH_END: usize = 0x24;

/// Offset of the header size field
pub const HEADER_SIZE_OFFSET: usize = 0x64;

/// Offset of the version tag
pub const VERSION_OFFSET: usize = 0x68;

/// Offset of the entry count
pub const ENTRY_COUNT_OFFSET: usize = 0x6C;

/// Header intro, identical in every version
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
pub struct NefsIntro {
    /// Magic number
    pub magic: u32,
    /// SHA-256 of the header, excluding this field
    pub hash: Sha256Hash,
    /// AES-256 key as 64 ASCII hex characters, all zero when absent
    pub aes_key_hex: [u8; 64],
    /// Header size in bytes (primary plus secondary section)
    pub header_size: u32,
    /// Version tag
    pub version: u32,
    /// Number of entries
    pub entry_count: u32,
    /// Unknown, preserved
    pub unknown_0x70: u32,
    /// Unknown, preserved
    pub unknown_0x74: u32,
    /// Unknown, preserved
    pub unknown_0x78: u64,
}

impl TocRecord for NefsIntro {
    const SIZE: usize = INTRO_SIZE;
}

impl Default for NefsIntro {
    fn default() -> Self {
        Self {
            magic: NEFS_MAGIC,
            hash: Sha256Hash::default(),
            aes_key_hex: [0; 64],
            header_size: 0,
            version: 0,
            entry_count: 0,
            unknown_0x70: 0,
            unknown_0x74: 0,
            unknown_0x78: 0,
        }
    }
}

impl NefsIntro {
    /// AES key carried by the intro
    pub fn aes_key(&self) -> NefsResult<Option<AesKey>> {
        Ok(AesKey::from_hex_ascii(&self.aes_key_hex)?)
    }

    /// Store an AES key, or clear it
    pub fn set_aes_key(&mut self, key: Option<&AesKey>) {
        self.aes_key_hex = key.map_or([0; 64], AesKey::to_hex_ascii);
    }
}

/// Byte order in which `bytes` start with the magic number
pub fn detect_magic(bytes: &[u8]) -> Option<Endian> {
    let magic: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    if u32::from_le_bytes(magic) == NEFS_MAGIC {
        Some(Endian::Little)
    } else if u32::from_be_bytes(magic) == NEFS_MAGIC {
        Some(Endian::Big)
    } else {
        None
    }
}

/// Read a u32 field from raw intro bytes
pub fn read_u32(bytes: &[u8], offset: usize, endian: Endian) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(offset..offset + 4)?.try_into().ok()?;
    Some(match endian {
        Endian::Little => u32::from_le_bytes(raw),
        Endian::Big => u32::from_be_bytes(raw),
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::toc::TocCodec;
    use binrw::io::Cursor;

    #[test]
    fn test_intro_field_offsets() {
        let intro = NefsIntro {
            header_size: 0x1234,
            version: 0x0002_0000,
            entry_count: 7,
            ..NefsIntro::default()
        };

        let mut cursor = Cursor::new(Vec::new());
        TocCodec::new(Endian::Little)
            .write_record(&mut cursor, 0, &intro)
            .unwrap();
        let bytes = cursor.into_inner();

        assert_eq!(bytes.len(), INTRO_SIZE);
        assert_eq!(&bytes[..4], b"NeFS");
        assert_eq!(read_u32(&bytes, HEADER_SIZE_OFFSET, Endian::Little), Some(0x1234));
        assert_eq!(read_u32(&bytes, VERSION_OFFSET, Endian::Little), Some(0x0002_0000));
        assert_eq!(read_u32(&bytes, 0x6C, Endian::Little), Some(7));
    }

    #[test]
    fn test_detect_magic() {
        assert_eq!(detect_magic(b"NeFS...."), Some(Endian::Little));
        assert_eq!(detect_magic(b"SFeN"), Some(Endian::Big));
        assert_eq!(detect_magic(b"NeF"), None);
        assert_eq!(detect_magic(b"ABCD"), None);
    }

    #[test]
    fn test_aes_key_round_trip() {
        let mut intro = NefsIntro::default();
        assert_eq!(intro.aes_key().unwrap(), None);

        let key = AesKey::from_bytes([0x5A; 32]);
        intro.set_aes_key(Some(&key));
        assert_eq!(intro.aes_key().unwrap(), Some(key));
    }
}
