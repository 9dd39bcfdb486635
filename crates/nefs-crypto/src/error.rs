//! Error types for cryptographic operations

use thiserror::Error;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key size
    #[error("Invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize {
        /// Expected key size in bytes
        expected: usize,
        /// Actual key size in bytes
        actual: usize,
    },

    /// Invalid key format
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Cipher input is not a whole number of blocks
    #[error("Invalid block length: {length} is not a multiple of {block_size}")]
    InvalidBlockLength {
        /// Length of the rejected input
        length: usize,
        /// Cipher block size
        block_size: usize,
    },
}
