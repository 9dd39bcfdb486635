//! Item data transforms
//!
//! Item payloads are split into fixed-size chunks. Each chunk is optionally
//! compressed (LZSS and/or deflate) and optionally AES-256 encrypted; the
//! chunk table records the cumulative transformed size of every chunk.
//! Reading reverses the steps: decrypt, inflate, then LZSS.

pub mod chunk;
pub mod lzss;
pub mod pipeline;

use nefs_crypto::AesKey;

pub use chunk::{chunk_checksum, detransform_chunk, transform_chunk};
pub use lzss::LzssDecompressor;
pub use pipeline::{TransformedItem, detransform_item, transform_item};

/// Per-chunk transform steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChunkTransform {
    /// Deflate compression
    pub deflate: bool,
    /// LZSS compression
    pub lzss: bool,
    /// AES-256-ECB encryption
    pub aes: bool,
}

impl ChunkTransform {
    /// No transform
    pub const NONE: Self = Self {
        deflate: false,
        lzss: false,
        aes: false,
    };

    /// Whether any step is applied
    pub const fn is_transformed(&self) -> bool {
        self.deflate || self.lzss || self.aes
    }

    /// Decode a 1.5.1/1.6.0 chunk transform code
    pub const fn from_code(code: u16) -> Option<Self> {
        let (deflate, lzss, aes) = match code {
            0 => (false, false, false),
            1 => (true, false, false),
            2 => (false, true, false),
            3 => (false, false, true),
            4 => (true, false, true),
            5 => (false, true, true),
            _ => return None,
        };
        Some(Self { deflate, lzss, aes })
    }

    /// Encode as a 1.5.1/1.6.0 chunk transform code
    ///
    /// Deflate combined with LZSS has no code.
    pub const fn to_code(&self) -> Option<u16> {
        match (self.deflate, self.lzss, self.aes) {
            (false, false, false) => Some(0),
            (true, false, false) => Some(1),
            (false, true, false) => Some(2),
            (false, false, true) => Some(3),
            (true, false, true) => Some(4),
            (false, true, true) => Some(5),
            _ => None,
        }
    }

    /// Decode a 2.0.0 chunk transform bit set
    pub const fn from_bits(bits: u16) -> Self {
        Self {
            deflate: bits & 0x1 != 0,
            aes: bits & 0x2 != 0,
            lzss: bits & 0x4 != 0,
        }
    }

    /// Encode as a 2.0.0 chunk transform bit set
    pub const fn to_bits(&self) -> u16 {
        let mut bits = 0;
        if self.deflate {
            bits |= 0x1;
        }
        if self.aes {
            bits |= 0x2;
        }
        if self.lzss {
            bits |= 0x4;
        }
        bits
    }
}

/// How an item's data is transformed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NefsDataTransform {
    /// Chunk size in bytes
    pub chunk_size: u32,
    /// Deflate compression
    pub deflate: bool,
    /// LZSS compression
    pub lzss: bool,
    /// AES key; `Some` means chunks are encrypted
    pub aes_key: Option<AesKey>,
}

impl NefsDataTransform {
    /// Untransformed data with the given chunk size
    pub const fn new(chunk_size: u32) -> Self {
        Self {
            chunk_size,
            deflate: false,
            lzss: false,
            aes_key: None,
        }
    }

    /// Enable deflate compression
    #[must_use]
    pub const fn with_deflate(mut self) -> Self {
        self.deflate = true;
        self
    }

    /// Enable LZSS compression
    #[must_use]
    pub const fn with_lzss(mut self) -> Self {
        self.lzss = true;
        self
    }

    /// Enable AES encryption
    #[must_use]
    pub const fn with_aes(mut self, key: AesKey) -> Self {
        self.aes_key = Some(key);
        self
    }

    /// Build from chunk steps and the archive key
    pub const fn from_chunk(chunk_size: u32, chunk: ChunkTransform, key: Option<AesKey>) -> Self {
        Self {
            chunk_size,
            deflate: chunk.deflate,
            lzss: chunk.lzss,
            aes_key: if chunk.aes { key } else { None },
        }
    }

    /// Chunk steps
    pub const fn chunk_transform(&self) -> ChunkTransform {
        ChunkTransform {
            deflate: self.deflate,
            lzss: self.lzss,
            aes: self.aes_key.is_some(),
        }
    }

    /// Whether any step is applied
    pub const fn is_transformed(&self) -> bool {
        self.deflate || self.lzss || self.aes_key.is_some()
    }

    /// Number of chunks for `extracted_size` bytes
    pub fn chunk_count(&self, extracted_size: u64) -> u64 {
        if self.chunk_size == 0 {
            return 0;
        }
        extracted_size.div_ceil(u64::from(self.chunk_size))
    }
}

impl Default for NefsDataTransform {
    fn default() -> Self {
        Self::new(crate::header::DEFAULT_CHUNK_SIZE)
    }
}

/// One chunk of a transformed item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NefsDataChunk {
    /// Transformed size of this chunk
    pub size: u32,
    /// Cumulative transformed size at the end of this chunk
    pub cumulative_size: u32,
    /// CRC-16 of the transformed bytes, when the version records one
    pub checksum: Option<u16>,
    /// Steps applied to this chunk
    pub transform: ChunkTransform,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in 0..=5 {
            let transform = ChunkTransform::from_code(code).unwrap();
            assert_eq!(transform.to_code(), Some(code));
        }
        assert_eq!(ChunkTransform::from_code(6), None);
    }

    #[test]
    fn test_bits() {
        let transform = ChunkTransform::from_bits(0x3);
        assert!(transform.deflate);
        assert!(transform.aes);
        assert!(!transform.lzss);
        assert_eq!(transform.to_bits(), 0x3);

        let both = ChunkTransform::from_bits(0x5);
        assert_eq!(both.to_code(), None);
    }

    #[test]
    fn test_chunk_count() {
        let transform = NefsDataTransform::new(64).with_deflate();
        assert_eq!(transform.chunk_count(0), 0);
        assert_eq!(transform.chunk_count(50), 1);
        assert_eq!(transform.chunk_count(64), 1);
        assert_eq!(transform.chunk_count(65), 2);
    }

    #[test]
    fn test_aes_key_drives_encryption() {
        let key = AesKey::from_bytes([1; 32]);
        let chunk = ChunkTransform::from_code(4).unwrap();
        let transform = NefsDataTransform::from_chunk(0x10000, chunk, Some(key));
        assert_eq!(transform.aes_key, Some(key));
        assert_eq!(transform.chunk_transform(), chunk);

        let missing = NefsDataTransform::from_chunk(0x10000, chunk, None);
        assert!(!missing.chunk_transform().aes);
    }
}
