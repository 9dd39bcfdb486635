//! Fixed-size record codec for header tables
//!
//! Every header table is a flat array of fixed-size records. Records are
//! read and written at explicit absolute positions; nothing assumes the
//! stream is already positioned. Byte order is chosen per archive and passed
//! at runtime, and each record type swaps its own fields through binrw.

pub mod flags;
pub mod name_table;
pub mod records;

use binrw::io::{Cursor, Read, Seek, SeekFrom, Write};
use binrw::{BinRead, BinWrite, Endian};

use crate::NefsResult;

pub use flags::{EntryFlags, FlagLayout};
pub use name_table::{NameTable, NameTableBuilder};
pub use records::*;

/// A record with a fixed on-disk size
pub trait TocRecord:
    Sized + for<'a> BinRead<Args<'a> = ()> + for<'a> BinWrite<Args<'a> = ()>
{
    /// Serialized size in bytes
    const SIZE: usize;
}

impl TocRecord for nefs_crypto::Sha256Hash {
    const SIZE: usize = 32;
}

/// Record reader/writer with a reusable scratch buffer
///
/// The scratch buffer grows to the largest table requested so far and is
/// reused for every later request.
#[derive(Debug)]
pub struct TocCodec {
    endian: Endian,
    scratch: Vec<u8>,
}

impl TocCodec {
    /// Create a codec for the given archive byte order
    pub const fn new(endian: Endian) -> Self {
        Self {
            endian,
            scratch: Vec::new(),
        }
    }

    /// Archive byte order
    pub const fn endian(&self) -> Endian {
        self.endian
    }

    /// Current scratch capacity
    pub fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }

    fn scratch(&mut self, len: usize) -> &mut [u8] {
        if self.scratch.len() < len {
            self.scratch.resize(len, 0);
        }
        &mut self.scratch[..len]
    }

    /// Read one record at an absolute offset
    ///
    /// A short read is an error.
    pub fn read_record<T: TocRecord, R: Read + Seek>(
        &mut self,
        reader: &mut R,
        offset: u64,
    ) -> NefsResult<T> {
        let mut records = self.read_records(reader, offset, 1)?;
        records
            .pop()
            .ok_or_else(|| crate::NefsError::InvalidHeader("empty record read".to_string()))
    }

    /// Read `count` consecutive records starting at an absolute offset
    pub fn read_records<T: TocRecord, R: Read + Seek>(
        &mut self,
        reader: &mut R,
        offset: u64,
        count: usize,
    ) -> NefsResult<Vec<T>> {
        let len = count * T::SIZE;
        let endian = self.endian;

        reader.seek(SeekFrom::Start(offset))?;
        let buffer = self.scratch(len);
        reader.read_exact(buffer)?;

        let mut cursor = Cursor::new(&buffer[..]);
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(T::read_options(&mut cursor, endian, ())?);
        }
        Ok(records)
    }

    /// Write one record at an absolute offset
    pub fn write_record<T: TocRecord, W: Write + Seek>(
        &mut self,
        writer: &mut W,
        offset: u64,
        record: &T,
    ) -> NefsResult<()> {
        self.write_records(writer, offset, std::slice::from_ref(record))
    }

    /// Write consecutive records starting at an absolute offset
    pub fn write_records<T: TocRecord, W: Write + Seek>(
        &mut self,
        writer: &mut W,
        offset: u64,
        records: &[T],
    ) -> NefsResult<()> {
        let len = records.len() * T::SIZE;
        let endian = self.endian;

        let buffer = self.scratch(len);
        let mut cursor = Cursor::new(&mut buffer[..]);
        for record in records {
            record.write_options(&mut cursor, endian, ())?;
        }

        writer.seek(SeekFrom::Start(offset))?;
        writer.write_all(&self.scratch[..len])?;
        Ok(())
    }

    /// Read raw bytes at an absolute offset
    pub fn read_bytes<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        offset: u64,
        len: usize,
    ) -> NefsResult<Vec<u8>> {
        reader.seek(SeekFrom::Start(offset))?;
        let buffer = self.scratch(len);
        reader.read_exact(buffer)?;
        Ok(buffer.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_at_explicit_offset() {
        let mut data = vec![0xAAu8; 6];
        data.extend_from_slice(&[1, 0, 0, 0, 2, 0, 0, 0]);
        let mut cursor = Cursor::new(data);

        let mut codec = TocCodec::new(Endian::Little);
        let blocks: Vec<Block010> = codec.read_records(&mut cursor, 6, 2).unwrap();
        assert_eq!(blocks, vec![Block010 { end: 1 }, Block010 { end: 2 }]);
        assert!(codec.scratch_capacity() >= 8);
    }

    #[test]
    fn test_short_read_is_fatal() {
        let mut cursor = Cursor::new(vec![0u8; 10]);
        let mut codec = TocCodec::new(Endian::Little);
        let result: NefsResult<Vec<Block010>> = codec.read_records(&mut cursor, 4, 2);
        assert!(result.is_err());
    }

    #[test]
    fn test_byte_orders_decode_to_same_values() {
        let record = Entry160 {
            data_offset: 0x0102_0304_0506_0708,
            shared_info: 3,
            first_block: NO_BLOCKS,
            next_duplicate: 9,
        };

        let mut le = Cursor::new(Vec::new());
        let mut be = Cursor::new(Vec::new());
        TocCodec::new(Endian::Little)
            .write_record(&mut le, 0, &record)
            .unwrap();
        TocCodec::new(Endian::Big)
            .write_record(&mut be, 0, &record)
            .unwrap();
        assert_ne!(le.get_ref(), be.get_ref());
        assert_eq!(be.get_ref()[..8], [1, 2, 3, 4, 5, 6, 7, 8]);

        let from_le: Entry160 = TocCodec::new(Endian::Little)
            .read_record(&mut le, 0)
            .unwrap();
        let from_be: Entry160 = TocCodec::new(Endian::Big)
            .read_record(&mut be, 0)
            .unwrap();
        assert_eq!(from_le, record);
        assert_eq!(from_be, record);
    }
}
