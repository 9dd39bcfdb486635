//! Cryptographic operations for NeFS archive headers
//!
//! NeFS headers ship in one of three forms: plain, scrambled with a XOR
//! diffusion network, or signed with a 1024-bit RSA key whose decrypted intro
//! carries the AES-256 key for the rest of the header. This crate provides
//! the primitives for all three, plus the SHA-256 hash used for header
//! integrity checks.
//!
//! # Components
//!
//! - **XOR codec**: [`xor::decode_intro`] / [`xor::encode_intro`]
//! - **RSA**: raw modular exponentiation against a [`RsaKeyStore`] ([`rsa_block`])
//! - **AES**: AES-256-ECB with zero padding ([`ecb::AesKey`])
//! - **Hashing**: [`Sha256Hash`] and the incremental [`HeaderHasher`]
//!
//! # Examples
//!
//! ```
//! use nefs_crypto::ecb::AesKey;
//!
//! let key = AesKey::from_bytes([0x42; 32]);
//! let encrypted = nefs_crypto::ecb::encrypt_ecb_zero_padded(&key, b"hello");
//! assert_eq!(encrypted.len(), 16);
//!
//! let decrypted = nefs_crypto::ecb::decrypt_ecb_padded(&key, &encrypted);
//! assert_eq!(&decrypted[..5], b"hello");
//! ```

#![warn(missing_docs)]

pub mod ecb;
pub mod error;
pub mod hash;
pub mod keys;
pub mod rsa_block;
pub mod xor;

pub use error::CryptoError;

// Re-export commonly used types
pub use ecb::AesKey;
pub use hash::{HeaderHasher, Sha256Hash};
pub use keys::{RsaKey, RsaKeyStore};

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;
