//! Configuration for archive reading, writing and scanning

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::NefsResult;
use crate::header::{DEFAULT_CHUNK_SIZE, DEFAULT_HASH_BLOCK_SIZE};

/// Default step between scanner window probes
pub const DEFAULT_SCAN_ALIGNMENT: usize = 4;

/// Options shared by the reader, writer and executable scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NefsConfig {
    /// Recompute and compare header hashes on read
    pub verify_header_hash: bool,

    /// Text file listing known RSA keys (`name modulus-hex` per line)
    pub rsa_key_file: Option<PathBuf>,

    /// Chunk size for items added without an explicit transform
    pub default_chunk_size: u32,

    /// Size of each data block covered by one hash digest (1.6.0+)
    pub hash_block_size: u32,

    /// Step, in bytes, between writable-section probes in executables
    pub scan_alignment: usize,
}

impl Default for NefsConfig {
    fn default() -> Self {
        Self {
            verify_header_hash: true,
            rsa_key_file: None,
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            hash_block_size: DEFAULT_HASH_BLOCK_SIZE,
            scan_alignment: DEFAULT_SCAN_ALIGNMENT,
        }
    }
}

impl NefsConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> NefsResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> NefsResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Enable or disable header hash verification
    #[must_use]
    pub const fn with_hash_verification(mut self, enable: bool) -> Self {
        self.verify_header_hash = enable;
        self
    }

    /// Set the RSA key list file
    #[must_use]
    pub fn with_rsa_key_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.rsa_key_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the chunk size used for new items
    #[must_use]
    pub const fn with_default_chunk_size(mut self, size: u32) -> Self {
        self.default_chunk_size = size;
        self
    }

    /// Set the data block size covered by each hash digest
    #[must_use]
    pub const fn with_hash_block_size(mut self, size: u32) -> Self {
        self.hash_block_size = size;
        self
    }

    /// Set the scanner probe step; zero is treated as one
    #[must_use]
    pub const fn with_scan_alignment(mut self, alignment: usize) -> Self {
        self.scan_alignment = if alignment == 0 { 1 } else { alignment };
        self
    }
}
