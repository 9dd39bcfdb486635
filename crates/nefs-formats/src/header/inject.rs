//! NefsInject header patch files
//!
//! An inject file carries the primary and secondary header sections of a
//! headless archive so a modified header can be shipped without touching the
//! game executable. A 32-byte little-endian prefix locates both sections
//! inside the inject file; item data stays in the separate data file.

use std::io::{Read, Seek, SeekFrom, Write};

use binrw::{BinRead, BinWrite};

use crate::{NefsError, NefsResult};

/// Magic number of an inject file
pub const INJECT_MAGIC: u32 = 4484;

/// Only known inject format version
pub const INJECT_VERSION: u32 = 1;

/// Inject prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct NefsInjectHeader {
    /// Magic number
    pub magic: u32,
    /// Format version
    pub version: u32,
    /// Offset of the primary section in the inject file
    pub primary_offset: u64,
    /// Size of the primary section
    pub primary_size: u32,
    /// Offset of the secondary section in the inject file
    pub secondary_offset: u64,
    /// Size of the secondary section
    pub secondary_size: u32,
}

impl NefsInjectHeader {
    /// Serialized size
    pub const SIZE: usize = 32;

    /// Prefix for sections stored back to back right after it
    pub const fn new(primary_size: u32, secondary_size: u32) -> Self {
        Self {
            magic: INJECT_MAGIC,
            version: INJECT_VERSION,
            primary_offset: Self::SIZE as u64,
            primary_size,
            secondary_offset: Self::SIZE as u64 + primary_size as u64,
            secondary_size,
        }
    }

    /// Read and validate a prefix at the start of `reader`
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> NefsResult<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let header = Self::read(reader)?;
        if header.magic != INJECT_MAGIC {
            return Err(NefsError::InvalidHeader(format!(
                "inject magic {} is not {INJECT_MAGIC}",
                header.magic
            )));
        }
        if header.version != INJECT_VERSION {
            return Err(NefsError::InvalidHeader(format!(
                "unsupported inject version {}",
                header.version
            )));
        }
        Ok(header)
    }

    /// Read both sections
    pub fn read_sections<R: Read + Seek>(&self, reader: &mut R) -> NefsResult<(Vec<u8>, Vec<u8>)> {
        let mut primary = vec![0u8; self.primary_size as usize];
        reader.seek(SeekFrom::Start(self.primary_offset))?;
        reader.read_exact(&mut primary)?;

        let mut secondary = vec![0u8; self.secondary_size as usize];
        reader.seek(SeekFrom::Start(self.secondary_offset))?;
        reader.read_exact(&mut secondary)?;

        Ok((primary, secondary))
    }
}

/// Write an inject file holding both header sections
pub fn write_inject<W: Write + Seek>(
    writer: &mut W,
    primary: &[u8],
    secondary: &[u8],
) -> NefsResult<NefsInjectHeader> {
    let primary_size = u32::try_from(primary.len())
        .map_err(|_| NefsError::InvalidHeader("primary section exceeds 4 GiB".to_string()))?;
    let secondary_size = u32::try_from(secondary.len())
        .map_err(|_| NefsError::InvalidHeader("secondary section exceeds 4 GiB".to_string()))?;

    let header = NefsInjectHeader::new(primary_size, secondary_size);
    writer.seek(SeekFrom::Start(0))?;
    header.write(writer)?;
    writer.write_all(primary)?;
    writer.write_all(secondary)?;
    Ok(header)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_layout() {
        let mut cursor = Cursor::new(Vec::new());
        let header = write_inject(&mut cursor, b"primary", b"sec").unwrap();
        let bytes = cursor.into_inner();

        assert_eq!(bytes.len(), NefsInjectHeader::SIZE + 10);
        assert_eq!(&bytes[..4], &4484u32.to_le_bytes());
        assert_eq!(&bytes[8..16], &32u64.to_le_bytes());
        assert_eq!(header.secondary_offset, 39);

        let mut cursor = Cursor::new(bytes);
        let read = NefsInjectHeader::read_from(&mut cursor).unwrap();
        assert_eq!(read, header);
        let (primary, secondary) = read.read_sections(&mut cursor).unwrap();
        assert_eq!(primary, b"primary".to_vec());
        assert_eq!(secondary, b"sec".to_vec());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = vec![0u8; 32];
        bytes[0] = 1;
        assert!(NefsInjectHeader::read_from(&mut Cursor::new(bytes)).is_err());
    }
}
