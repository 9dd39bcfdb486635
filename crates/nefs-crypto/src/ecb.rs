//! AES-256-ECB with zero padding
//!
//! NeFS uses a single AES-256 key per archive, carried in the header intro as
//! 64 ASCII hex characters. The same key encrypts the tail of RSA-signed
//! headers and the chunks of encrypted items. ECB mode with zero padding is
//! what the format uses; there is no IV and no authentication.

use aes::Aes256;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use std::fmt;

use crate::{CryptoError, CryptoResult};

/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

/// Length of the ASCII hex key representation stored in headers
pub const AES_KEY_HEX_LEN: usize = 64;

/// A 256-bit AES key
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AesKey([u8; 32]);

impl AesKey {
    /// Create a key from raw bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse the 64-byte ASCII hex buffer found in a header intro
    ///
    /// An all-zero buffer means the archive carries no key and is reported as
    /// `Ok(None)`.
    pub fn from_hex_ascii(buffer: &[u8; AES_KEY_HEX_LEN]) -> CryptoResult<Option<Self>> {
        if buffer.iter().all(|&b| b == 0) {
            return Ok(None);
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(buffer, &mut bytes)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid AES key hex: {e}")))?;
        Ok(Some(Self(bytes)))
    }

    /// Render the key as the uppercase ASCII hex buffer stored in headers
    pub fn to_hex_ascii(&self) -> [u8; AES_KEY_HEX_LEN] {
        let mut buffer = [0u8; AES_KEY_HEX_LEN];
        let encoded = hex::encode_upper(self.0);
        buffer.copy_from_slice(encoded.as_bytes());
        buffer
    }

    /// Raw key bytes
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn cipher(&self) -> Aes256 {
        Aes256::new(GenericArray::from_slice(&self.0))
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only the first bytes, keys end up in logs otherwise
        write!(f, "AesKey({}..)", hex::encode_upper(&self.0[..4]))
    }
}

impl fmt::Display for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

/// Decrypt whole blocks in place
///
/// The input length must be a multiple of [`AES_BLOCK_SIZE`].
pub fn decrypt_ecb(key: &AesKey, data: &mut [u8]) -> CryptoResult<()> {
    if data.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidBlockLength {
            length: data.len(),
            block_size: AES_BLOCK_SIZE,
        });
    }

    let cipher = key.cipher();
    for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

/// Encrypt whole blocks in place
///
/// The input length must be a multiple of [`AES_BLOCK_SIZE`].
pub fn encrypt_ecb(key: &AesKey, data: &mut [u8]) -> CryptoResult<()> {
    if data.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidBlockLength {
            length: data.len(),
            block_size: AES_BLOCK_SIZE,
        });
    }

    let cipher = key.cipher();
    for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

/// Round a length up to the next whole AES block
pub const fn padded_len(len: usize) -> usize {
    len.div_ceil(AES_BLOCK_SIZE) * AES_BLOCK_SIZE
}

/// Encrypt data, zero-padding the final block
pub fn encrypt_ecb_zero_padded(key: &AesKey, data: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; padded_len(data.len())];
    buffer[..data.len()].copy_from_slice(data);

    let cipher = key.cipher();
    for block in buffer.chunks_exact_mut(AES_BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    buffer
}

/// Decrypt data whose final block may be short
///
/// A short trailing block is zero-extended before decryption. The output
/// keeps the padded length; callers truncate to the size they expect.
pub fn decrypt_ecb_padded(key: &AesKey, data: &[u8]) -> Vec<u8> {
    let mut buffer = vec![0u8; padded_len(data.len())];
    buffer[..data.len()].copy_from_slice(data);

    let cipher = key.cipher();
    for block in buffer.chunks_exact_mut(AES_BLOCK_SIZE) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    buffer
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_key() -> AesKey {
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        AesKey::from_bytes(bytes)
    }

    #[test]
    fn test_fips197_vector() {
        // FIPS-197 appendix C.3
        let key = test_key();
        let mut block = hex::decode("00112233445566778899aabbccddeeff").unwrap();
        encrypt_ecb(&key, &mut block).unwrap();
        assert_eq!(hex::encode(&block), "8ea2b7ca516745bfeafc49904b496089");

        decrypt_ecb(&key, &mut block).unwrap();
        assert_eq!(hex::encode(&block), "00112233445566778899aabbccddeeff");
    }

    #[test]
    fn test_zero_padding_round_trip() {
        let key = test_key();
        let data = b"twenty-one bytes long";
        let encrypted = encrypt_ecb_zero_padded(&key, data);
        assert_eq!(encrypted.len(), 32);

        let decrypted = decrypt_ecb_padded(&key, &encrypted);
        assert_eq!(&decrypted[..data.len()], data);
        assert!(decrypted[data.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_partial_block_rejected() {
        let key = test_key();
        let mut data = [0u8; 15];
        assert!(matches!(
            decrypt_ecb(&key, &mut data),
            Err(CryptoError::InvalidBlockLength { length: 15, .. })
        ));
    }

    #[test]
    fn test_hex_ascii_round_trip() {
        let key = test_key();
        let ascii = key.to_hex_ascii();
        assert_eq!(&ascii[..8], b"00010203");

        let parsed = AesKey::from_hex_ascii(&ascii).unwrap();
        assert_eq!(parsed, Some(key));
    }

    #[test]
    fn test_zero_hex_buffer_means_no_key() {
        assert_eq!(AesKey::from_hex_ascii(&[0u8; 64]).unwrap(), None);
    }

    #[test]
    fn test_invalid_hex_buffer() {
        let buffer = [b'Z'; 64];
        assert!(AesKey::from_hex_ascii(&buffer).is_err());
    }
}
