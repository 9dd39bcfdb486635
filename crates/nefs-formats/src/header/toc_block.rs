//! Table-of-contents blocks following the intro
//!
//! Three ToC shapes exist. Each converts to and from [`TocInfo`], the
//! version-independent set of table offsets and archive parameters.

use binrw::{BinRead, BinWrite};

use super::{DEFAULT_CHUNK_SIZE, HASH_BLOCK_SHIFT};
use crate::toc::TocRecord;

/// Table offsets and archive parameters found in a ToC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TocInfo {
    /// Entry table offset
    pub entry_offset: u32,
    /// Shared-info table offset
    pub shared_offset: u32,
    /// Name table offset
    pub name_offset: u32,
    /// Chunk (block) table offset
    pub block_offset: u32,
    /// Volume-info table offset
    pub volume_offset: u32,
    /// Writable entry table offset
    pub writable_entry_offset: u32,
    /// Writable shared-info table offset
    pub writable_shared_offset: u32,
    /// Hash digest table offset (1.6.0+)
    pub hash_digest_offset: Option<u32>,
    /// Number of volumes, when the ToC records it
    pub volume_count: Option<u16>,
    /// Chunk size of transformed items
    pub chunk_size: u32,
    /// Data block size covered by each hash digest, when recorded
    pub hash_block_size: Option<u32>,
}

/// A ToC layout
pub trait TocBlock: TocRecord + Clone + std::fmt::Debug + PartialEq {
    /// Extract offsets and parameters
    fn info(&self) -> TocInfo;

    /// Build from offsets and parameters; fields the layout lacks are dropped
    fn from_info(info: &TocInfo) -> Self;
}

const fn shift_hash_block(size: Option<u32>) -> u16 {
    match size {
        Some(size) => (size >> HASH_BLOCK_SHIFT) as u16,
        None => 0,
    }
}

/// ToC used by 0.1.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct Toc010 {
    /// Entry table offset
    pub entry_offset: u32,
    /// Shared-info table offset
    pub shared_offset: u32,
    /// Name table offset
    pub name_offset: u32,
    /// Chunk table offset
    pub block_offset: u32,
    /// Volume-info table offset
    pub volume_offset: u32,
    /// Writable entry table offset
    pub writable_entry_offset: u32,
    /// Writable shared-info table offset
    pub writable_shared_offset: u32,
    /// Reserved
    pub reserved: u32,
}

impl TocRecord for Toc010 {
    const SIZE: usize = 0x20;
}

impl TocBlock for Toc010 {
    fn info(&self) -> TocInfo {
        TocInfo {
            entry_offset: self.entry_offset,
            shared_offset: self.shared_offset,
            name_offset: self.name_offset,
            block_offset: self.block_offset,
            volume_offset: self.volume_offset,
            writable_entry_offset: self.writable_entry_offset,
            writable_shared_offset: self.writable_shared_offset,
            hash_digest_offset: None,
            volume_count: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            hash_block_size: None,
        }
    }

    fn from_info(info: &TocInfo) -> Self {
        Self {
            entry_offset: info.entry_offset,
            shared_offset: info.shared_offset,
            name_offset: info.name_offset,
            block_offset: info.block_offset,
            volume_offset: info.volume_offset,
            writable_entry_offset: info.writable_entry_offset,
            writable_shared_offset: info.writable_shared_offset,
            reserved: 0,
        }
    }
}

/// ToC used by 1.3.0, 1.5.0 and 1.5.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct Toc130 {
    /// Number of volumes
    pub volume_count: u16,
    /// Hash block size shifted right by 15
    pub hash_block_size: u16,
    /// Chunk size
    pub chunk_size: u32,
    /// Entry table offset
    pub entry_offset: u32,
    /// Shared-info table offset
    pub shared_offset: u32,
    /// Name table offset
    pub name_offset: u32,
    /// Chunk table offset
    pub block_offset: u32,
    /// Volume-info table offset
    pub volume_offset: u32,
    /// Writable entry table offset
    pub writable_entry_offset: u32,
    /// Writable shared-info table offset
    pub writable_shared_offset: u32,
    /// Reserved
    pub reserved: [u8; 28],
}

impl TocRecord for Toc130 {
    const SIZE: usize = 0x40;
}

impl TocBlock for Toc130 {
    fn info(&self) -> TocInfo {
        TocInfo {
            entry_offset: self.entry_offset,
            shared_offset: self.shared_offset,
            name_offset: self.name_offset,
            block_offset: self.block_offset,
            volume_offset: self.volume_offset,
            writable_entry_offset: self.writable_entry_offset,
            writable_shared_offset: self.writable_shared_offset,
            hash_digest_offset: None,
            volume_count: Some(self.volume_count),
            chunk_size: self.chunk_size,
            hash_block_size: Some(u32::from(self.hash_block_size) << HASH_BLOCK_SHIFT),
        }
    }

    fn from_info(info: &TocInfo) -> Self {
        Self {
            volume_count: info.volume_count.unwrap_or(1),
            hash_block_size: shift_hash_block(info.hash_block_size),
            chunk_size: info.chunk_size,
            entry_offset: info.entry_offset,
            shared_offset: info.shared_offset,
            name_offset: info.name_offset,
            block_offset: info.block_offset,
            volume_offset: info.volume_offset,
            writable_entry_offset: info.writable_entry_offset,
            writable_shared_offset: info.writable_shared_offset,
            reserved: [0; 28],
        }
    }
}

/// Extended ToC used by 1.6.0 and 2.0.0
///
/// Writable table offsets are relative to the secondary section, which for
/// standard archives starts at offset zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct Toc160 {
    /// Number of volumes
    pub volume_count: u16,
    /// Hash block size shifted right by 15
    pub hash_block_size: u16,
    /// Chunk size
    pub chunk_size: u32,
    /// Entry table offset
    pub entry_offset: u32,
    /// Shared-info table offset
    pub shared_offset: u32,
    /// Name table offset
    pub name_offset: u32,
    /// Chunk table offset
    pub block_offset: u32,
    /// Volume-info table offset
    pub volume_offset: u32,
    /// Writable entry table offset (secondary-relative)
    pub writable_entry_offset: u32,
    /// Writable shared-info table offset (secondary-relative)
    pub writable_shared_offset: u32,
    /// Hash digest table offset
    pub hash_digest_offset: u32,
    /// Reserved
    pub reserved: [u8; 24],
}

impl TocRecord for Toc160 {
    const SIZE: usize = 0x40;
}

impl TocBlock for Toc160 {
    fn info(&self) -> TocInfo {
        TocInfo {
            entry_offset: self.entry_offset,
            shared_offset: self.shared_offset,
            name_offset: self.name_offset,
            block_offset: self.block_offset,
            volume_offset: self.volume_offset,
            writable_entry_offset: self.writable_entry_offset,
            writable_shared_offset: self.writable_shared_offset,
            hash_digest_offset: Some(self.hash_digest_offset),
            volume_count: Some(self.volume_count),
            chunk_size: self.chunk_size,
            hash_block_size: Some(u32::from(self.hash_block_size) << HASH_BLOCK_SHIFT),
        }
    }

    fn from_info(info: &TocInfo) -> Self {
        Self {
            volume_count: info.volume_count.unwrap_or(1),
            hash_block_size: shift_hash_block(info.hash_block_size),
            chunk_size: info.chunk_size,
            entry_offset: info.entry_offset,
            shared_offset: info.shared_offset,
            name_offset: info.name_offset,
            block_offset: info.block_offset,
            volume_offset: info.volume_offset,
            writable_entry_offset: info.writable_entry_offset,
            writable_shared_offset: info.writable_shared_offset,
            hash_digest_offset: info.hash_digest_offset.unwrap_or(0),
            reserved: [0; 24],
        }
    }
}
