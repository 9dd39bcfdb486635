//! Single-chunk transforms

use std::io::{Read, Write};

use crc::{CRC_16_ARC, Crc};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use nefs_crypto::AesKey;
use nefs_crypto::ecb::{decrypt_ecb_padded, encrypt_ecb_zero_padded};

use super::{ChunkTransform, lzss};
use crate::{NefsError, NefsResult};

const CHECKSUM: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// CRC-16 of transformed chunk bytes
pub fn chunk_checksum(data: &[u8]) -> u16 {
    CHECKSUM.checksum(data)
}

/// Apply the forward transform to one chunk of extracted bytes
///
/// Steps run as LZSS, deflate, then AES with zero padding.
pub fn transform_chunk(
    data: &[u8],
    steps: ChunkTransform,
    key: Option<&AesKey>,
) -> NefsResult<Vec<u8>> {
    let mut buffer = if steps.lzss {
        lzss::compress(data)
    } else {
        data.to_vec()
    };

    if steps.deflate {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&buffer)?;
        buffer = encoder.finish()?;
    }

    if steps.aes {
        let key = key.ok_or_else(|| missing_key())?;
        buffer = encrypt_ecb_zero_padded(key, &buffer);
    }

    Ok(buffer)
}

/// Reverse the transform of one chunk
///
/// The result is clamped to `expected_len`; bytes past it are discarded.
pub fn detransform_chunk(
    data: &[u8],
    steps: ChunkTransform,
    key: Option<&AesKey>,
    expected_len: usize,
) -> NefsResult<Vec<u8>> {
    let mut buffer = if steps.aes {
        let key = key.ok_or_else(|| missing_key())?;
        decrypt_ecb_padded(key, data)
    } else {
        data.to_vec()
    };

    if steps.deflate {
        let mut inflated = Vec::with_capacity(expected_len);
        let decoder = DeflateDecoder::new(&buffer[..]);
        let result = if steps.lzss {
            decoder.take(u64::MAX).read_to_end(&mut inflated)
        } else {
            decoder.take(expected_len as u64).read_to_end(&mut inflated)
        };
        result.map_err(|e| NefsError::Decompression(format!("inflate failed: {e}")))?;
        buffer = inflated;
    }

    if steps.lzss {
        buffer = lzss::decompress(&buffer, expected_len)?;
    }

    buffer.truncate(expected_len);
    Ok(buffer)
}

fn missing_key() -> NefsError {
    NefsError::InvalidHeader("chunk is AES encrypted but the archive has no key".to_string())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<u8> {
        b"racing game asset bytes, racing game asset bytes, ".repeat(20)
    }

    #[test]
    fn test_crc16_arc_check_value() {
        assert_eq!(chunk_checksum(b"123456789"), 0xBB3D);
    }

    #[test]
    fn test_identity_chunk_is_clamped() {
        let data = sample();
        let out = detransform_chunk(&data, ChunkTransform::NONE, None, 10).unwrap();
        assert_eq!(out, data[..10].to_vec());
    }

    #[test]
    fn test_every_step_combination() {
        let key = AesKey::from_bytes([9; 32]);
        let data = sample();

        for code in 0..=5 {
            let steps = ChunkTransform::from_code(code).unwrap();
            let transformed = transform_chunk(&data, steps, Some(&key)).unwrap();
            if steps.deflate || steps.lzss {
                assert!(transformed.len() < data.len());
            }
            let restored = detransform_chunk(&transformed, steps, Some(&key), data.len()).unwrap();
            assert_eq!(restored, data, "code {code}");
        }

        let both = ChunkTransform::from_bits(0x7);
        let transformed = transform_chunk(&data, both, Some(&key)).unwrap();
        let restored = detransform_chunk(&transformed, both, Some(&key), data.len()).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_missing_key() {
        let steps = ChunkTransform::from_code(3).unwrap();
        assert!(transform_chunk(b"data", steps, None).is_err());
        assert!(detransform_chunk(&[0; 16], steps, None, 4).is_err());
    }

    #[test]
    fn test_corrupt_deflate() {
        let steps = ChunkTransform::from_code(1).unwrap();
        let result = detransform_chunk(&[0xFF; 32], steps, None, 64);
        assert!(matches!(result, Err(NefsError::Decompression(_))));
    }
}
