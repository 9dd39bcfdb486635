//! RSA public key management
//!
//! RSA-signed NeFS headers carry no hint about which title key signed them,
//! so readers try every known key in order. Keys are stored as the raw
//! 128-byte modulus exactly as it is found in game binaries; the byte order
//! of that buffer is resolved at decryption time.

use std::fmt;

use crate::error::CryptoError;
use crate::rsa_block::RSA_BLOCK_SIZE;

/// A named 1024-bit RSA public key (modulus only, exponent is fixed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaKey {
    /// Human-readable key name, usually the game title
    pub name: String,
    /// 128-byte modulus in the byte order it was published
    pub modulus: [u8; RSA_BLOCK_SIZE],
}

impl RsaKey {
    /// Create a new key
    pub fn new(name: impl Into<String>, modulus: [u8; RSA_BLOCK_SIZE]) -> Self {
        Self {
            name: name.into(),
            modulus,
        }
    }

    /// Parse a key from a hex-encoded modulus
    pub fn from_hex(name: impl Into<String>, hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex.trim())
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid hex: {e}")))?;

        if bytes.len() != RSA_BLOCK_SIZE {
            return Err(CryptoError::InvalidKeySize {
                expected: RSA_BLOCK_SIZE,
                actual: bytes.len(),
            });
        }

        let mut modulus = [0u8; RSA_BLOCK_SIZE];
        modulus.copy_from_slice(&bytes);
        Ok(Self::new(name, modulus))
    }
}

impl fmt::Display for RsaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}..", self.name, hex::encode_upper(&self.modulus[..8]))
    }
}

/// Ordered store of known RSA keys
///
/// Trial order is insertion order.
#[derive(Debug, Clone, Default)]
pub struct RsaKeyStore {
    keys: Vec<RsaKey>,
}

impl RsaKeyStore {
    /// Create an empty key store
    pub fn empty() -> Self {
        Self { keys: Vec::new() }
    }

    /// Add a key; a key with the same name is replaced in place
    pub fn add(&mut self, key: RsaKey) {
        if let Some(existing) = self.keys.iter_mut().find(|k| k.name == key.name) {
            *existing = key;
        } else {
            self.keys.push(key);
        }
    }

    /// Remove a key by name
    pub fn remove(&mut self, name: &str) -> Option<RsaKey> {
        let index = self.keys.iter().position(|k| k.name == name)?;
        Some(self.keys.remove(index))
    }

    /// Get a key by name
    pub fn get(&self, name: &str) -> Option<&RsaKey> {
        self.keys.iter().find(|k| k.name == name)
    }

    /// Get the number of keys in the store
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate over keys in trial order
    pub fn iter(&self) -> impl Iterator<Item = &RsaKey> + '_ {
        self.keys.iter()
    }

    /// Load keys from text content (format: `name modulus_hex` per line)
    ///
    /// Lines starting with `#` or `//` are treated as comments.
    /// Returns the number of keys successfully loaded.
    ///
    /// # Example
    ///
    /// ```
    /// use nefs_crypto::RsaKeyStore;
    ///
    /// let modulus = "AB".repeat(128);
    /// let content = format!("# title keys\nExampleTitle {modulus}\nbroken-line\n");
    ///
    /// let mut store = RsaKeyStore::empty();
    /// assert_eq!(store.load_from_txt(&content), 1);
    /// assert!(store.get("ExampleTitle").is_some());
    /// ```
    pub fn load_from_txt(&mut self, content: &str) -> usize {
        let mut count = 0;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 2 {
                continue;
            }

            if let Ok(key) = RsaKey::from_hex(parts[0], parts[1]) {
                self.add(key);
                count += 1;
            }
        }

        count
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_hex() {
        let key = RsaKey::from_hex("title", &"01".repeat(128)).expect("valid key");
        assert_eq!(key.name, "title");
        assert_eq!(key.modulus[0], 0x01);
        assert_eq!(key.modulus[127], 0x01);
    }

    #[test]
    fn test_key_invalid_size() {
        let result = RsaKey::from_hex("short", "0102");
        assert!(matches!(result, Err(CryptoError::InvalidKeySize { .. })));
    }

    #[test]
    fn test_store_keeps_insertion_order() {
        let mut store = RsaKeyStore::empty();
        store.add(RsaKey::new("b", [2; 128]));
        store.add(RsaKey::new("a", [1; 128]));
        store.add(RsaKey::new("b", [3; 128]));

        let names: Vec<&str> = store.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(store.get("b").map(|k| k.modulus[0]), Some(3));

        assert!(store.remove("a").is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_load_from_txt_skips_comments() {
        let content = format!(
            "// comment\n# another\n\nfirst {}\nsecond {}\nbad zz\n",
            "0A".repeat(128),
            "0B".repeat(128)
        );
        let mut store = RsaKeyStore::empty();
        assert_eq!(store.load_from_txt(&content), 2);
        assert_eq!(store.len(), 2);
    }
}
