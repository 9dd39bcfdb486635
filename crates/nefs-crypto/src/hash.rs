//! SHA-256 hashing for header integrity and data block digests

use binrw::{BinRead, BinWrite};
use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 digest as stored in NeFS headers
#[derive(BinRead, BinWrite, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Sha256Hash(pub [u8; 32]);

impl Sha256Hash {
    /// Size of a digest in bytes
    pub const SIZE: usize = 32;

    /// Create from raw bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash a single buffer
    pub fn from_data(data: &[u8]) -> Self {
        let mut hasher = HeaderHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Hash the concatenation of several buffers
    pub fn from_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = HeaderHasher::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize()
    }

    /// Raw digest bytes
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True when every byte is zero (no hash recorded)
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Hash({})", self.to_hex())
    }
}

/// Incremental SHA-256 over header sections
///
/// Header hashes skip the stored hash field and may span two sections
/// (primary and secondary), so callers feed the covered ranges piecewise.
#[derive(Clone, Default)]
pub struct HeaderHasher {
    inner: Sha256,
}

impl HeaderHasher {
    /// Start a new hash
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Feed more covered bytes
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finish and return the digest
    pub fn finalize(self) -> Sha256Hash {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&self.inner.finalize());
        Sha256Hash(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        let hash = Sha256Hash::from_data(b"abc");
        assert_eq!(
            hash.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_parts_equal_concatenation() {
        let whole = Sha256Hash::from_data(b"NeFS header bytes");
        let parts = Sha256Hash::from_parts(&[&b"NeFS"[..], &b" header"[..], &b" bytes"[..]]);
        assert_eq!(whole, parts);
    }

    #[test]
    fn test_zero_hash() {
        assert!(Sha256Hash::default().is_zero());
        assert!(!Sha256Hash::from_data(b"").is_zero());
    }
}
