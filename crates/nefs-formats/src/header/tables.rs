//! Generic table engine
//!
//! Reads and writes the tables of any [`HeaderLayout`]. The ToC only records
//! where each table starts; a table ends where the next table of the same
//! section starts, or at the end of its section.

use binrw::Endian;
use binrw::io::Cursor;
use nefs_crypto::Sha256Hash;
use tracing::{debug, error, warn};

use super::intro::{HASH_END, HASH_OFFSET, INTRO_SIZE, NefsIntro};
use super::layout::{
    BlockRecord, ChunkRecord, EntryRecord, HeaderLayout, SharedRecord, TocEntry, TocSharedInfo,
    TocVolume, VolumeRecord, WritableEntryRecord,
};
use super::toc_block::{TocBlock, TocInfo};
use super::{HeaderMeta, VersionedHeader};
use crate::toc::{NameTable, TocCodec, TocRecord, WritableShared};
use crate::{NefsError, NefsResult};

/// Version-independent contents of every header table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderTables {
    /// Entries, indexed by id
    pub entries: Vec<TocEntry>,
    /// Shared-info records
    pub shared_infos: Vec<TocSharedInfo>,
    /// Name table
    pub names: NameTable,
    /// Chunk records of all items
    pub chunks: Vec<ChunkRecord>,
    /// Volumes
    pub volumes: Vec<TocVolume>,
    /// Per-block data hashes (1.6.0+)
    pub hash_digests: Vec<Sha256Hash>,
    /// Chunk size of transformed items
    pub chunk_size: u32,
    /// Data block size covered by each digest
    pub hash_block_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Primary,
    Secondary,
}

/// Location of one table inside the header image
#[derive(Debug, Clone, Copy)]
struct TableSpan {
    name: &'static str,
    offset: u64,
    section: Section,
}

/// Byte ranges of every table, in image order
#[derive(Debug)]
struct TableMap {
    spans: Vec<TableSpan>,
    primary_end: u64,
    secondary_end: u64,
    toc_end: u64,
}

impl TableMap {
    fn section_bounds(&self, section: Section) -> (u64, u64) {
        match section {
            Section::Primary => (0, self.primary_end),
            Section::Secondary => (self.primary_end, self.secondary_end),
        }
    }

    /// Byte range of table `index`
    ///
    /// Offsets inside the intro or ToC mean the table is absent.
    fn range(&self, index: usize) -> Option<(u64, u64)> {
        let span = self.spans[index];
        let (start, end) = self.section_bounds(span.section);

        if span.offset < self.toc_end {
            debug!("Table {} is absent (offset {})", span.name, span.offset);
            return None;
        }
        if span.offset < start || span.offset > end {
            error!(
                "Table {} offset {} lies outside its section [{start}, {end}); treating it as empty",
                span.name, span.offset
            );
            return None;
        }

        let mut table_end = end;
        for (other_index, other) in self.spans.iter().enumerate() {
            if other_index == index
                || other.section != span.section
                || other.offset < self.toc_end
                || other.offset < start
            {
                continue;
            }
            let bounds = other.offset > span.offset
                || (other.offset == span.offset && other_index > index);
            if bounds {
                table_end = table_end.min(other.offset);
            }
        }

        Some((span.offset, table_end))
    }

    fn count(&self, index: usize, record_size: usize) -> Option<(u64, usize)> {
        let (start, end) = self.range(index)?;
        let len = (end - start) as usize;
        if len % record_size != 0 {
            warn!(
                "Table {} size {len} is not a multiple of its record size {record_size}",
                self.spans[index].name
            );
        }
        Some((start, len / record_size))
    }
}

const ENTRIES: usize = 0;
const SHARED: usize = 1;
const NAMES: usize = 2;
const BLOCKS: usize = 3;
const VOLUMES: usize = 4;
const HASH_DIGESTS: usize = 5;
const WRITABLE_ENTRIES: usize = 6;
const WRITABLE_SHARED: usize = 7;

fn table_map<L: HeaderLayout>(info: &TocInfo, image_len: u64, secondary_base: Option<u32>) -> TableMap {
    let (primary_end, writable_section) = match secondary_base {
        Some(base) => (u64::from(base), Section::Secondary),
        None => (image_len, Section::Primary),
    };
    let writable_base = if L::SPLIT_SECTIONS {
        u64::from(secondary_base.unwrap_or(0))
    } else {
        0
    };

    let primary = |name, offset: u32| TableSpan {
        name,
        offset: u64::from(offset),
        section: Section::Primary,
    };
    let writable = |name, offset: u32| TableSpan {
        name,
        offset: writable_base + u64::from(offset),
        section: writable_section,
    };

    // Image order; equal offsets are resolved in favour of the later table
    let spans = vec![
        primary("entries", info.entry_offset),
        primary("shared infos", info.shared_offset),
        primary("names", info.name_offset),
        primary("blocks", info.block_offset),
        primary("volumes", info.volume_offset),
        primary("hash digests", info.hash_digest_offset.unwrap_or(0)),
        writable("writable entries", info.writable_entry_offset),
        writable("writable shared infos", info.writable_shared_offset),
    ];

    TableMap {
        spans,
        primary_end,
        secondary_end: image_len,
        toc_end: (INTRO_SIZE + L::Toc::SIZE) as u64,
    }
}

fn read_table<T: TocRecord>(
    codec: &mut TocCodec,
    image: &mut Cursor<&[u8]>,
    map: &TableMap,
    index: usize,
) -> NefsResult<Vec<T>> {
    match map.count(index, T::SIZE) {
        Some((offset, count)) => codec.read_records(image, offset, count),
        None => Ok(Vec::new()),
    }
}

/// Parse every table of a decoded header image
pub fn read_tables<L: HeaderLayout>(
    image: &[u8],
    meta: HeaderMeta,
) -> NefsResult<VersionedHeader<L>> {
    let mut codec = TocCodec::new(meta.endian);
    let mut cursor = Cursor::new(image);

    if image.len() < INTRO_SIZE + L::Toc::SIZE {
        return Err(NefsError::InvalidHeader(format!(
            "header of {} bytes is too small for a {} ToC",
            image.len(),
            L::VERSION
        )));
    }

    let intro: NefsIntro = codec.read_record(&mut cursor, 0)?;
    let toc: L::Toc = codec.read_record(&mut cursor, INTRO_SIZE as u64)?;
    let info = toc.info();
    let map = table_map::<L>(&info, image.len() as u64, meta.secondary_base);

    let entries: Vec<L::Entry> = read_table(&mut codec, &mut cursor, &map, ENTRIES)?;
    let shared_infos: Vec<L::Shared> = read_table(&mut codec, &mut cursor, &map, SHARED)?;
    let names = match map.range(NAMES) {
        Some((start, end)) => {
            NameTable::from_bytes(codec.read_bytes(&mut cursor, start, (end - start) as usize)?)
        }
        None => NameTable::default(),
    };
    let blocks: Vec<L::Block> = read_table(&mut codec, &mut cursor, &map, BLOCKS)?;
    let volumes: Vec<L::Volume> = read_table(&mut codec, &mut cursor, &map, VOLUMES)?;
    let mut writable_entries: Vec<L::Writable> =
        read_table(&mut codec, &mut cursor, &map, WRITABLE_ENTRIES)?;
    let mut writable_shared: Vec<WritableShared> =
        read_table(&mut codec, &mut cursor, &map, WRITABLE_SHARED)?;
    let hash_digests: Vec<Sha256Hash> = if L::HAS_HASH_DIGESTS {
        read_table(&mut codec, &mut cursor, &map, HASH_DIGESTS)?
    } else {
        Vec::new()
    };

    if entries.len() != intro.entry_count as usize {
        warn!(
            "Intro declares {} entries but the entry table holds {}",
            intro.entry_count,
            entries.len()
        );
    }
    if writable_entries.len() > entries.len() {
        warn!(
            "Writable entry table has {} records for {} entries",
            writable_entries.len(),
            entries.len()
        );
        writable_entries.truncate(entries.len());
    }
    if writable_shared.len() > shared_infos.len() {
        warn!(
            "Writable shared table has {} records for {} shared infos",
            writable_shared.len(),
            shared_infos.len()
        );
        writable_shared.truncate(shared_infos.len());
    }

    debug!(
        "Read {} header: {} entries, {} shared infos, {} chunks, {} volumes",
        L::VERSION,
        entries.len(),
        shared_infos.len(),
        blocks.len(),
        volumes.len()
    );

    Ok(VersionedHeader {
        intro,
        toc,
        entries,
        shared_infos,
        names,
        blocks,
        volumes,
        writable_entries,
        writable_shared,
        hash_digests,
        meta,
    })
}

fn table_len(count: usize, size: usize) -> NefsResult<u32> {
    u32::try_from(count * size)
        .map_err(|_| NefsError::InvalidHeader("header table exceeds 4 GiB".to_string()))
}

/// Build a header from normalized tables and serialize it
///
/// Offsets are assigned in table order, the image is written, and the header
/// hash is computed over the finished image and patched into the intro.
/// Headless headers place the writable tables in a secondary section whose
/// offsets count from its own start.
pub fn build<L: HeaderLayout>(
    template: &NefsIntro,
    tables: &HeaderTables,
    endian: Endian,
    headless: bool,
) -> NefsResult<(VersionedHeader<L>, Vec<u8>)> {
    if headless && !L::SPLIT_SECTIONS {
        return Err(NefsError::InvalidHeader(format!(
            "version {} has no secondary section",
            L::VERSION
        )));
    }

    let entries: Vec<L::Entry> = tables.entries.iter().map(L::Entry::store).collect();
    let shared_infos: Vec<L::Shared> = tables.shared_infos.iter().map(L::Shared::store).collect();
    let blocks: Vec<L::Block> = tables.chunks.iter().map(L::Block::store).collect();
    let volumes: Vec<L::Volume> = tables.volumes.iter().map(L::Volume::store).collect();
    let writable_entries: Vec<L::Writable> = tables
        .entries
        .iter()
        .map(|e| L::Writable::new(e.volume, L::FLAGS.encode(e.flags)))
        .collect();
    let writable_shared: Vec<WritableShared> = tables
        .shared_infos
        .iter()
        .map(|s| WritableShared {
            next_sibling: s.next_sibling,
            patched_entry: s.patched_entry,
        })
        .collect();
    let hash_digests = if L::HAS_HASH_DIGESTS {
        tables.hash_digests.clone()
    } else {
        Vec::new()
    };

    let mut offset = (INTRO_SIZE + L::Toc::SIZE) as u32;
    let mut place = |len: u32| {
        let start = offset;
        offset += len;
        start
    };

    let entry_offset = place(table_len(entries.len(), L::Entry::SIZE)?);
    let shared_offset = place(table_len(shared_infos.len(), L::Shared::SIZE)?);
    let name_offset = place(table_len(tables.names.len(), 1)?);
    let block_offset = place(table_len(blocks.len(), L::Block::SIZE)?);
    let volume_offset = place(table_len(volumes.len(), L::Volume::SIZE)?);
    let hash_digest_offset = if L::HAS_HASH_DIGESTS {
        Some(place(table_len(hash_digests.len(), Sha256Hash::SIZE)?))
    } else {
        None
    };
    let primary_len = offset;

    let writable_entry_len = table_len(writable_entries.len(), L::Writable::SIZE)?;
    let writable_shared_len = table_len(writable_shared.len(), WritableShared::SIZE)?;
    let (writable_entry_offset, writable_shared_offset) = if headless {
        (0, writable_entry_len)
    } else {
        (primary_len, primary_len + writable_entry_len)
    };
    let header_size = primary_len + writable_entry_len + writable_shared_len;

    let info = TocInfo {
        entry_offset,
        shared_offset,
        name_offset,
        block_offset,
        volume_offset,
        writable_entry_offset,
        writable_shared_offset,
        hash_digest_offset,
        volume_count: Some(volumes.len() as u16),
        chunk_size: tables.chunk_size,
        hash_block_size: Some(tables.hash_block_size),
    };

    let mut intro = template.clone();
    intro.hash = Sha256Hash::default();
    intro.header_size = header_size;
    intro.version = L::VERSION.tag();
    intro.entry_count = entries.len() as u32;

    let mut header = VersionedHeader {
        intro,
        toc: L::Toc::from_info(&info),
        entries,
        shared_infos,
        names: tables.names.clone(),
        blocks,
        volumes,
        writable_entries,
        writable_shared,
        hash_digests,
        meta: HeaderMeta {
            endian,
            secondary_base: headless.then_some(primary_len),
            ..HeaderMeta::default()
        },
    };

    let mut image = serialize(&header)?;
    if L::VERSION.has_header_hash() {
        let hash = header_hash(&image);
        image[HASH_OFFSET..HASH_END].copy_from_slice(hash.as_bytes());
        header.intro.hash = hash;
    }

    debug!(
        "Built {} header: {} bytes, primary section {} bytes",
        L::VERSION,
        header_size,
        primary_len
    );

    Ok((header, image))
}

/// Serialize a header at the offsets recorded in its ToC
pub fn serialize<L: HeaderLayout>(header: &VersionedHeader<L>) -> NefsResult<Vec<u8>> {
    let info = header.toc.info();
    let size = header.intro.header_size as usize;
    let writable_base = if L::SPLIT_SECTIONS {
        u64::from(header.meta.secondary_base.unwrap_or(0))
    } else {
        0
    };

    let mut codec = TocCodec::new(header.meta.endian);
    let mut cursor = Cursor::new(vec![0u8; size]);

    codec.write_record(&mut cursor, 0, &header.intro)?;
    codec.write_record(&mut cursor, INTRO_SIZE as u64, &header.toc)?;
    codec.write_records(&mut cursor, u64::from(info.entry_offset), &header.entries)?;
    codec.write_records(&mut cursor, u64::from(info.shared_offset), &header.shared_infos)?;
    write_bytes(&mut cursor, u64::from(info.name_offset), header.names.as_bytes())?;
    codec.write_records(&mut cursor, u64::from(info.block_offset), &header.blocks)?;
    codec.write_records(&mut cursor, u64::from(info.volume_offset), &header.volumes)?;
    codec.write_records(
        &mut cursor,
        writable_base + u64::from(info.writable_entry_offset),
        &header.writable_entries,
    )?;
    codec.write_records(
        &mut cursor,
        writable_base + u64::from(info.writable_shared_offset),
        &header.writable_shared,
    )?;
    if let Some(offset) = info.hash_digest_offset {
        codec.write_records(&mut cursor, u64::from(offset), &header.hash_digests)?;
    }

    let mut image = cursor.into_inner();
    if image.len() != size {
        warn!(
            "Header tables extend past the declared header size ({} > {size})",
            image.len()
        );
        image.truncate(size);
    }
    Ok(image)
}

fn write_bytes(cursor: &mut Cursor<Vec<u8>>, offset: u64, bytes: &[u8]) -> NefsResult<()> {
    use binrw::io::{Seek, SeekFrom, Write};
    cursor.seek(SeekFrom::Start(offset))?;
    cursor.write_all(bytes)?;
    Ok(())
}

/// SHA-256 of a decoded header image, skipping the stored hash
pub fn header_hash(image: &[u8]) -> Sha256Hash {
    let head = &image[..HASH_OFFSET.min(image.len())];
    let tail = image.get(HASH_END..).unwrap_or_default();
    Sha256Hash::from_parts(&[head, tail])
}
