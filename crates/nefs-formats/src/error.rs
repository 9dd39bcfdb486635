//! Error types for NeFS archive operations

use std::path::PathBuf;

use thiserror::Error;

use crate::header::NefsVersion;

/// NeFS operation result type
pub type NefsResult<T> = Result<T, NefsError>;

/// Errors raised while reading, writing or scanning NeFS archives
///
/// Header hash mismatches and out-of-bounds sub-tables are not errors: they
/// are logged and reflected in the parsed header instead.
#[derive(Debug, Error)]
pub enum NefsError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary parsing error
    #[error("Binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),

    /// Header cryptography error
    #[error("Crypto error: {0}")]
    Crypto(#[from] nefs_crypto::CryptoError),

    /// Configuration file could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Header does not start with the NeFS magic number in any known form
    #[error("Invalid magic number: {0:02x?}")]
    InvalidMagic([u8; 4]),

    /// Version tag is not one of the supported layouts
    #[error("Unsupported NeFS version: 0x{0:08x}")]
    UnsupportedVersion(u32),

    /// No known RSA key decrypts the header intro
    #[error("No known RSA key decrypts the header ({tried} keys tried)")]
    RsaKeyNotFound {
        /// Number of keys that were tried
        tried: usize,
    },

    /// Header is structurally unusable
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Compressed chunk data is corrupt
    #[error("Decompression failed: {0}")]
    Decompression(String),

    /// Operation was cancelled through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// An item marked as removed reached the writer
    #[error("Item {0} is marked as removed and cannot be written")]
    RemovedItem(u32),

    /// An item has no data to write
    #[error("Item {0} has no data source")]
    MissingDataSource(u32),

    /// A file backing an added or replaced item does not exist
    #[error("Source file not found: {}", .0.display())]
    SourceFileNotFound(PathBuf),

    /// Items disagree on the chunk size the archive must declare
    #[error("Inconsistent chunk size: archive uses {expected}, item {id} uses {actual}")]
    InconsistentChunkSize {
        /// Chunk size already chosen for the archive
        expected: u32,
        /// Chunk size requested by the item
        actual: u32,
        /// Offending item id
        id: u32,
    },

    /// Item transform cannot be expressed by the target version
    #[error("Version {version} cannot store the transform of item {id}")]
    UnsupportedTransform {
        /// Target header version
        version: NefsVersion,
        /// Offending item id
        id: u32,
    },

    /// Item lookup failed
    #[error("Item not found: {0}")]
    ItemNotFound(String),
}

impl NefsError {
    /// True for the cancellation signal, as opposed to a data error
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
