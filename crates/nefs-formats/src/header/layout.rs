//! Per-version table layouts
//!
//! Each version is a [`HeaderLayout`]: a zero-sized descriptor naming the
//! record type used for every table. The generic table engine in
//! [`super::tables`] reads and writes any layout, and the record traits here
//! convert between on-disk records and the normalized `Toc*` views.

use std::fmt::Debug;

use tracing::warn;

use super::NefsVersion;
use super::toc_block::{Toc010, Toc130, Toc160, TocBlock};
use crate::toc::{
    Block010, Block151, Block200, Entry010, Entry160, EntryFlags, FlagLayout, Shared010,
    Shared160, TocRecord, Volume010, Volume150, WritableEntry010, WritableEntry150,
};
use crate::transform::ChunkTransform;

/// Normalized entry: entry record plus writable entry record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TocEntry {
    /// Entry index
    pub id: u32,
    /// Data offset within the volume
    pub data_offset: u64,
    /// Index of the shared-info record
    pub shared_index: u32,
    /// Index of the first chunk record, or [`crate::toc::NO_BLOCKS`]
    pub first_block: u32,
    /// Next entry sharing the same data; the entry itself ends the chain
    pub next_duplicate: u32,
    /// Volume index
    pub volume: u16,
    /// Decoded flags
    pub flags: EntryFlags,
}

/// Normalized shared-info record plus writable shared record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TocSharedInfo {
    /// First entry using this record
    pub owner: u32,
    /// Parent directory entry; the owner itself for roots
    pub parent: u32,
    /// First child entry; the owner itself when there is none
    pub first_child: u32,
    /// Offset of the name in the name table
    pub name_offset: u32,
    /// Extracted size in bytes
    pub extracted_size: u32,
    /// Next sibling entry; the owner itself ends the chain
    pub next_sibling: u32,
    /// Entry this one patches; the owner itself when none
    pub patched_entry: u32,
}

/// Normalized chunk record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkRecord {
    /// Cumulative transformed size at the end of the chunk
    pub end: u32,
    /// CRC-16 of the transformed chunk, when the layout stores one
    pub checksum: Option<u16>,
    /// Chunk transform, when the layout stores one per chunk
    pub transform: Option<ChunkTransform>,
}

/// Normalized volume-info record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TocVolume {
    /// Volume size in bytes
    pub size: u64,
    /// Offset of the volume file name in the name table
    pub name_offset: u32,
    /// Split size, zero when the volume is one file
    pub split_size: u32,
}

/// Bounds shared by every table record
pub trait LayoutRecord: TocRecord + Copy + Debug + PartialEq + Eq + Default {}

impl<T: TocRecord + Copy + Debug + PartialEq + Eq + Default> LayoutRecord for T {}

/// Entry table record
pub trait EntryRecord: LayoutRecord {
    /// Whether the record stores the duplicate chain itself
    const STORES_NEXT_DUPLICATE: bool;

    /// Normalize; volume and flags come from the writable table
    fn load(&self, index: u32) -> TocEntry;

    /// Build from a normalized entry
    fn store(entry: &TocEntry) -> Self;
}

/// Shared-info table record
pub trait SharedRecord: LayoutRecord {
    /// Normalize; sibling and patch links come from the writable table
    fn load(&self) -> TocSharedInfo;

    /// Build from a normalized shared-info record
    fn store(info: &TocSharedInfo) -> Self;
}

/// Chunk table record
pub trait BlockRecord: LayoutRecord {
    /// Normalize
    fn load(&self) -> ChunkRecord;

    /// Build from a normalized chunk record
    fn store(record: &ChunkRecord) -> Self;
}

/// Volume-info table record
pub trait VolumeRecord: LayoutRecord {
    /// Normalize
    fn load(&self) -> TocVolume;

    /// Build from a normalized volume
    fn store(volume: &TocVolume) -> Self;
}

/// Writable entry table record
pub trait WritableEntryRecord: LayoutRecord {
    /// Volume index
    fn volume(&self) -> u16;

    /// Raw version-specific flag bits
    fn raw_flags(&self) -> u16;

    /// Build from a volume index and raw flags
    fn new(volume: u16, raw_flags: u16) -> Self;
}

impl EntryRecord for Entry010 {
    const STORES_NEXT_DUPLICATE: bool = false;

    fn load(&self, index: u32) -> TocEntry {
        TocEntry {
            id: index,
            data_offset: self.data_offset,
            shared_index: self.shared_info,
            first_block: self.first_block,
            next_duplicate: index,
            volume: 0,
            flags: EntryFlags::default(),
        }
    }

    fn store(entry: &TocEntry) -> Self {
        Self {
            data_offset: entry.data_offset,
            shared_info: entry.shared_index,
            first_block: entry.first_block,
            id: entry.id,
        }
    }
}

impl EntryRecord for Entry160 {
    const STORES_NEXT_DUPLICATE: bool = true;

    fn load(&self, index: u32) -> TocEntry {
        TocEntry {
            id: index,
            data_offset: self.data_offset,
            shared_index: self.shared_info,
            first_block: self.first_block,
            next_duplicate: self.next_duplicate,
            volume: 0,
            flags: EntryFlags::default(),
        }
    }

    fn store(entry: &TocEntry) -> Self {
        Self {
            data_offset: entry.data_offset,
            shared_info: entry.shared_index,
            first_block: entry.first_block,
            next_duplicate: entry.next_duplicate,
        }
    }
}

impl SharedRecord for Shared010 {
    fn load(&self) -> TocSharedInfo {
        TocSharedInfo {
            owner: self.id,
            parent: self.directory_id,
            first_child: self.first_child,
            name_offset: self.name_offset,
            extracted_size: self.extracted_size,
            next_sibling: self.id,
            patched_entry: self.id,
        }
    }

    fn store(info: &TocSharedInfo) -> Self {
        Self {
            id: info.owner,
            directory_id: info.parent,
            first_child: info.first_child,
            name_offset: info.name_offset,
            extracted_size: info.extracted_size,
        }
    }
}

impl SharedRecord for Shared160 {
    fn load(&self) -> TocSharedInfo {
        TocSharedInfo {
            owner: self.first_duplicate,
            parent: self.parent,
            first_child: self.first_child,
            name_offset: self.name_offset,
            extracted_size: self.extracted_size,
            next_sibling: self.first_duplicate,
            patched_entry: self.first_duplicate,
        }
    }

    fn store(info: &TocSharedInfo) -> Self {
        Self {
            parent: info.parent,
            first_child: info.first_child,
            name_offset: info.name_offset,
            extracted_size: info.extracted_size,
            first_duplicate: info.owner,
        }
    }
}

impl BlockRecord for Block010 {
    fn load(&self) -> ChunkRecord {
        ChunkRecord {
            end: self.end,
            checksum: None,
            transform: None,
        }
    }

    fn store(record: &ChunkRecord) -> Self {
        Self { end: record.end }
    }
}

impl BlockRecord for Block151 {
    fn load(&self) -> ChunkRecord {
        let transform = ChunkTransform::from_code(self.transform).unwrap_or_else(|| {
            warn!("Unknown chunk transform code {}", self.transform);
            ChunkTransform::NONE
        });
        ChunkRecord {
            end: self.end,
            checksum: Some(self.checksum),
            transform: Some(transform),
        }
    }

    fn store(record: &ChunkRecord) -> Self {
        Self {
            end: record.end,
            transform: record
                .transform
                .and_then(|t| t.to_code())
                .unwrap_or_default(),
            checksum: record.checksum.unwrap_or_default(),
        }
    }
}

impl BlockRecord for Block200 {
    fn load(&self) -> ChunkRecord {
        ChunkRecord {
            end: self.end,
            checksum: Some(self.checksum),
            transform: Some(ChunkTransform::from_bits(self.transform)),
        }
    }

    fn store(record: &ChunkRecord) -> Self {
        Self {
            end: record.end,
            checksum: record.checksum.unwrap_or_default(),
            transform: record.transform.map(|t| t.to_bits()).unwrap_or_default(),
        }
    }
}

impl VolumeRecord for Volume010 {
    fn load(&self) -> TocVolume {
        TocVolume {
            size: self.size,
            name_offset: self.name_offset,
            split_size: 0,
        }
    }

    fn store(volume: &TocVolume) -> Self {
        Self {
            size: volume.size,
            name_offset: volume.name_offset,
        }
    }
}

impl VolumeRecord for Volume150 {
    fn load(&self) -> TocVolume {
        TocVolume {
            size: self.size,
            name_offset: self.name_offset,
            split_size: self.split_size,
        }
    }

    fn store(volume: &TocVolume) -> Self {
        Self {
            size: volume.size,
            name_offset: volume.name_offset,
            split_size: volume.split_size,
        }
    }
}

impl WritableEntryRecord for WritableEntry010 {
    fn volume(&self) -> u16 {
        self.volume
    }

    fn raw_flags(&self) -> u16 {
        u16::from(self.flags)
    }

    fn new(volume: u16, raw_flags: u16) -> Self {
        Self {
            volume,
            flags: (raw_flags & 0xFF) as u8,
            reserved: 0,
        }
    }
}

impl WritableEntryRecord for WritableEntry150 {
    fn volume(&self) -> u16 {
        self.volume
    }

    fn raw_flags(&self) -> u16 {
        self.flags
    }

    fn new(volume: u16, raw_flags: u16) -> Self {
        Self {
            volume,
            flags: raw_flags,
        }
    }
}

/// Table layout of one header version
pub trait HeaderLayout: Debug + Clone + Copy + PartialEq + Eq + Default + 'static {
    /// Version tag
    const VERSION: NefsVersion;

    /// Entry flag mapping
    const FLAGS: FlagLayout;

    /// Writable tables may live in a separate secondary section
    const SPLIT_SECTIONS: bool;

    /// Header carries a per-block hash digest table
    const HAS_HASH_DIGESTS: bool;

    /// Chunk records carry their own transform
    const CHUNK_TRANSFORMS: bool;

    /// ToC block
    type Toc: TocBlock + LayoutRecord;
    /// Entry record
    type Entry: EntryRecord;
    /// Shared-info record
    type Shared: SharedRecord;
    /// Chunk record
    type Block: BlockRecord;
    /// Volume-info record
    type Volume: VolumeRecord;
    /// Writable entry record
    type Writable: WritableEntryRecord;
}

/// 0.1.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Layout010;

impl HeaderLayout for Layout010 {
    const VERSION: NefsVersion = NefsVersion::V010;
    const FLAGS: FlagLayout = FlagLayout::V010;
    const SPLIT_SECTIONS: bool = false;
    const HAS_HASH_DIGESTS: bool = false;
    const CHUNK_TRANSFORMS: bool = false;

    type Toc = Toc010;
    type Entry = Entry010;
    type Shared = Shared010;
    type Block = Block010;
    type Volume = Volume010;
    type Writable = WritableEntry010;
}

/// 1.3.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Layout130;

impl HeaderLayout for Layout130 {
    const VERSION: NefsVersion = NefsVersion::V130;
    const FLAGS: FlagLayout = FlagLayout::V010;
    const SPLIT_SECTIONS: bool = false;
    const HAS_HASH_DIGESTS: bool = false;
    const CHUNK_TRANSFORMS: bool = false;

    type Toc = Toc130;
    type Entry = Entry010;
    type Shared = Shared010;
    type Block = Block010;
    type Volume = Volume010;
    type Writable = WritableEntry010;
}

/// 1.5.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Layout150;

impl HeaderLayout for Layout150 {
    const VERSION: NefsVersion = NefsVersion::V150;
    const FLAGS: FlagLayout = FlagLayout::V150;
    const SPLIT_SECTIONS: bool = false;
    const HAS_HASH_DIGESTS: bool = false;
    const CHUNK_TRANSFORMS: bool = false;

    type Toc = Toc130;
    type Entry = Entry010;
    type Shared = Shared010;
    type Block = Block010;
    type Volume = Volume150;
    type Writable = WritableEntry150;
}

/// 1.5.1: 1.5.0 with per-chunk transforms and checksums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Layout151;

impl HeaderLayout for Layout151 {
    const VERSION: NefsVersion = NefsVersion::V151;
    const FLAGS: FlagLayout = FlagLayout::V150;
    const SPLIT_SECTIONS: bool = false;
    const HAS_HASH_DIGESTS: bool = false;
    const CHUNK_TRANSFORMS: bool = true;

    type Toc = Toc130;
    type Entry = Entry010;
    type Shared = Shared010;
    type Block = Block151;
    type Volume = Volume150;
    type Writable = WritableEntry150;
}

/// 1.6.0: extended ToC, secondary section and hash digests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Layout160;

impl HeaderLayout for Layout160 {
    const VERSION: NefsVersion = NefsVersion::V160;
    const FLAGS: FlagLayout = FlagLayout::V160;
    const SPLIT_SECTIONS: bool = true;
    const HAS_HASH_DIGESTS: bool = true;
    const CHUNK_TRANSFORMS: bool = true;

    type Toc = Toc160;
    type Entry = Entry160;
    type Shared = Shared160;
    type Block = Block151;
    type Volume = Volume150;
    type Writable = WritableEntry150;
}

/// 2.0.0: 1.6.0 with a new chunk record and flag set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Layout200;

impl HeaderLayout for Layout200 {
    const VERSION: NefsVersion = NefsVersion::V200;
    const FLAGS: FlagLayout = FlagLayout::V200;
    const SPLIT_SECTIONS: bool = true;
    const HAS_HASH_DIGESTS: bool = true;
    const CHUNK_TRANSFORMS: bool = true;

    type Toc = Toc160;
    type Entry = Entry160;
    type Shared = Shared160;
    type Block = Block200;
    type Volume = Volume150;
    type Writable = WritableEntry150;
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_block151_unknown_code_is_untransformed() {
        let record = Block151 {
            end: 10,
            transform: 9,
            checksum: 0x1234,
        };
        let chunk = record.load();
        assert_eq!(chunk.transform, Some(ChunkTransform::NONE));
        assert_eq!(chunk.checksum, Some(0x1234));
    }

    #[test]
    fn test_block200_stores_bits() {
        let chunk = ChunkRecord {
            end: 42,
            checksum: Some(7),
            transform: Some(ChunkTransform::from_bits(0x5)),
        };
        let record = Block200::store(&chunk);
        assert_eq!(record.transform, 0x5);
        assert_eq!(record.load(), chunk);
    }

    #[test]
    fn test_shared160_owner_is_first_duplicate() {
        let info = TocSharedInfo {
            owner: 4,
            parent: 1,
            first_child: 4,
            name_offset: 8,
            extracted_size: 100,
            next_sibling: 4,
            patched_entry: 4,
        };
        let record = Shared160::store(&info);
        assert_eq!(record.first_duplicate, 4);
        assert_eq!(record.load(), info);
        assert_eq!(Shared010::store(&info).load(), info);
    }

    #[test]
    fn test_writable_entry010_keeps_low_byte() {
        let record = WritableEntry010::new(2, 0x1F);
        assert_eq!(record.raw_flags(), 0x1F);
        assert_eq!(record.volume(), 2);
    }
}
