//! On-disk record layouts
//!
//! Record names carry the first version that introduced the layout; later
//! versions reuse a layout until it changes.

use binrw::{BinRead, BinWrite};

use super::TocRecord;

/// First-block value of an entry that has no chunk records
pub const NO_BLOCKS: u32 = 0xFFFF_FFFF;

/// Entry record, 0.1.0 through 1.5.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct Entry010 {
    /// Absolute data offset in the volume
    pub data_offset: u64,
    /// Index into the shared-info table
    pub shared_info: u32,
    /// Index of the first chunk record, or [`NO_BLOCKS`]
    pub first_block: u32,
    /// Entry id (equals the entry index)
    pub id: u32,
}

impl TocRecord for Entry010 {
    const SIZE: usize = 20;
}

/// Entry record, 1.6.0 and 2.0.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct Entry160 {
    /// Absolute data offset in the volume
    pub data_offset: u64,
    /// Index into the shared-info table
    pub shared_info: u32,
    /// Index of the first chunk record, or [`NO_BLOCKS`]
    pub first_block: u32,
    /// Next entry sharing the same data, or the entry itself
    pub next_duplicate: u32,
}

impl TocRecord for Entry160 {
    const SIZE: usize = 20;
}

/// Shared-info record, 0.1.0 through 1.5.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct Shared010 {
    /// Id of the entry owning the data
    pub id: u32,
    /// Parent directory id (own id for roots)
    pub directory_id: u32,
    /// First child id (own id when there are none)
    pub first_child: u32,
    /// Offset of the name in the name table
    pub name_offset: u32,
    /// Extracted size in bytes
    pub extracted_size: u32,
}

impl TocRecord for Shared010 {
    const SIZE: usize = 20;
}

/// Shared-info record, 1.6.0 and 2.0.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct Shared160 {
    /// Parent directory id (own id for roots)
    pub parent: u32,
    /// First child id (own id when there are none)
    pub first_child: u32,
    /// Offset of the name in the name table
    pub name_offset: u32,
    /// Extracted size in bytes
    pub extracted_size: u32,
    /// First entry of the duplicate chain, the data owner
    pub first_duplicate: u32,
}

impl TocRecord for Shared160 {
    const SIZE: usize = 20;
}

/// Chunk record, 0.1.0 through 1.5.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct Block010 {
    /// Cumulative transformed size at the end of this chunk
    pub end: u32,
}

impl TocRecord for Block010 {
    const SIZE: usize = 4;
}

/// Chunk record, 1.5.1 and 1.6.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct Block151 {
    /// Cumulative transformed size at the end of this chunk
    pub end: u32,
    /// Transform code
    pub transform: u16,
    /// CRC-16 of the transformed chunk bytes
    pub checksum: u16,
}

impl TocRecord for Block151 {
    const SIZE: usize = 8;
}

/// Chunk record, 2.0.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct Block200 {
    /// Cumulative transformed size at the end of this chunk
    pub end: u32,
    /// CRC-16 of the transformed chunk bytes
    pub checksum: u16,
    /// Transform bit set
    pub transform: u16,
}

impl TocRecord for Block200 {
    const SIZE: usize = 8;
}

/// Volume record, 0.1.0 and 1.3.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct Volume010 {
    /// Volume size in bytes
    pub size: u64,
    /// Offset of the data file name in the name table
    pub name_offset: u32,
}

impl TocRecord for Volume010 {
    const SIZE: usize = 12;
}

/// Volume record, 1.5.0 onwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct Volume150 {
    /// Volume size in bytes
    pub size: u64,
    /// Offset of the data file name in the name table
    pub name_offset: u32,
    /// Split file size, zero when the volume is a single file
    pub split_size: u32,
}

impl TocRecord for Volume150 {
    const SIZE: usize = 16;
}

/// Writable entry record, 0.1.0 and 1.3.0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct WritableEntry010 {
    /// Volume index
    pub volume: u16,
    /// Raw entry flags
    pub flags: u8,
    /// Reserved
    pub reserved: u8,
}

impl TocRecord for WritableEntry010 {
    const SIZE: usize = 4;
}

/// Writable entry record, 1.5.0 onwards
///
/// 1.6.0 and 2.0.0 keep this layout; only the meaning of the flag bits
/// changes between versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct WritableEntry150 {
    /// Volume index
    pub volume: u16,
    /// Raw entry flags
    pub flags: u16,
}

impl TocRecord for WritableEntry150 {
    const SIZE: usize = 4;
}

/// Writable shared-info record, every version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, BinRead, BinWrite)]
pub struct WritableShared {
    /// Next sibling id, or the owner itself for the last sibling
    pub next_sibling: u32,
    /// Entry patched by this one, or the owner itself
    pub patched_entry: u32,
}

impl TocRecord for WritableShared {
    const SIZE: usize = 8;
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use binrw::Endian;
    use binrw::io::Cursor;

    fn size_of<T: TocRecord + Default>() -> usize {
        let mut cursor = Cursor::new(Vec::new());
        T::default()
            .write_options(&mut cursor, Endian::Little, ())
            .unwrap();
        cursor.into_inner().len()
    }

    #[test]
    fn test_declared_sizes_match_serialized_sizes() {
        assert_eq!(size_of::<Entry010>(), Entry010::SIZE);
        assert_eq!(size_of::<Entry160>(), Entry160::SIZE);
        assert_eq!(size_of::<Shared010>(), Shared010::SIZE);
        assert_eq!(size_of::<Shared160>(), Shared160::SIZE);
        assert_eq!(size_of::<Block010>(), Block010::SIZE);
        assert_eq!(size_of::<Block151>(), Block151::SIZE);
        assert_eq!(size_of::<Block200>(), Block200::SIZE);
        assert_eq!(size_of::<Volume010>(), Volume010::SIZE);
        assert_eq!(size_of::<Volume150>(), Volume150::SIZE);
        assert_eq!(size_of::<WritableEntry010>(), WritableEntry010::SIZE);
        assert_eq!(size_of::<WritableEntry150>(), WritableEntry150::SIZE);
        assert_eq!(size_of::<WritableShared>(), WritableShared::SIZE);
    }

    #[test]
    fn test_block200_field_order() {
        let block = Block200 {
            end: 0x10,
            checksum: 0xBEEF,
            transform: 0x3,
        };
        let mut cursor = Cursor::new(Vec::new());
        block
            .write_options(&mut cursor, Endian::Little, ())
            .unwrap();
        assert_eq!(
            cursor.into_inner(),
            vec![0x10, 0, 0, 0, 0xEF, 0xBE, 0x03, 0x00]
        );
    }
}
