//! Archive writer
//!
//! The writer never patches a header in place. It takes the donor header
//! (version, byte order, AES key, split size) and an item list, stages all
//! item data in a temporary file, then rebuilds every table from scratch.
//! Removed items are dropped and the survivors renumbered in id order.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use nefs_crypto::{AesKey, Sha256Hash};
use tracing::{debug, info, warn};

use crate::config::NefsConfig;
use crate::fs::{FileSystem, StdFileSystem};
use crate::header::{
    ChunkRecord, DATA_ALIGNMENT, HeaderTables, NefsHeader, NefsVersion, TocEntry, TocSharedInfo,
    TocVolume, align_up,
};
use crate::item::{NefsDataSource, NefsItem, NefsItemList, NefsItemState};
use crate::progress::NefsProgress;
use crate::toc::{EntryFlags, NO_BLOCKS, NameTableBuilder};
use crate::transform::{
    ChunkTransform, NefsDataChunk, NefsDataTransform, detransform_item, transform_item,
};
use crate::volume::{MultiVolumeStream, split_file_path};
use crate::{NefsError, NefsResult};

/// Flags the writer derives from the item list; all others are carried over
const STRUCTURAL_FLAGS: u32 = EntryFlags::DEFLATE
    | EntryFlags::AES
    | EntryFlags::LZSS
    | EntryFlags::DIRECTORY
    | EntryFlags::DUPLICATED
    | EntryFlags::LAST_SIBLING
    | EntryFlags::PATCHED
    | EntryFlags::TRANSFORMED;

/// Header sections and data produced for a headless archive
#[derive(Debug, Clone)]
pub struct HeadlessOutput {
    /// Header as written
    pub header: NefsHeader,
    /// Primary section: intro, ToC and read-only tables
    pub primary: Vec<u8>,
    /// Secondary section: writable tables
    pub secondary: Vec<u8>,
}

/// Writes archives
pub struct NefsWriter {
    fs: Arc<dyn FileSystem>,
    config: NefsConfig,
}

impl std::fmt::Debug for NefsWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NefsWriter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for NefsWriter {
    fn default() -> Self {
        Self::new(NefsConfig::default())
    }
}

/// Whether a version can record a chunk transform
pub const fn can_store_transform(version: NefsVersion, transform: ChunkTransform) -> bool {
    match version {
        NefsVersion::V010 => !transform.lzss && !transform.aes,
        NefsVersion::V130 => !transform.lzss,
        NefsVersion::V150 | NefsVersion::V200 => true,
        NefsVersion::V151 | NefsVersion::V160 => transform.to_code().is_some(),
    }
}

/// Item after renumbering, with its data placed in the staging file
#[derive(Debug, Clone)]
struct PlacedItem {
    new_id: u32,
    parent: u32,
    owner: u32,
    data_offset: u64,
    first_block: u32,
    extracted_size: u64,
    transform: ChunkTransform,
    has_chunks: bool,
}

/// Item data staged in a temporary file, plus everything needed for tables
struct StagedArchive {
    version: NefsVersion,
    data: File,
    data_len: u64,
    items: Vec<(NefsItem, PlacedItem)>,
    chunks: Vec<ChunkRecord>,
    chunk_size: u32,
    hash_block_size: u32,
    hash_digests: Vec<Sha256Hash>,
    aes_key: Option<AesKey>,
}

impl NefsWriter {
    /// Create a writer on the local file system
    pub fn new(config: NefsConfig) -> Self {
        Self::with_file_system(config, Arc::new(StdFileSystem))
    }

    /// Create a writer on a custom file system
    pub fn with_file_system(config: NefsConfig, fs: Arc<dyn FileSystem>) -> Self {
        Self { fs, config }
    }

    /// Write a standard archive to `path`
    ///
    /// Split output is produced when the donor's first volume has a split
    /// size. Returns the header as written.
    pub fn write(
        &self,
        path: &Path,
        donor: &NefsHeader,
        items: &NefsItemList,
        progress: &NefsProgress,
    ) -> NefsResult<NefsHeader> {
        let mut staged = {
            let _task = progress.begin_task(0.8, "Writing item data");
            self.stage(donor, items, progress)?
        };

        let _task = progress.begin_task(0.2, "Writing header");
        progress.check_cancelled()?;

        let volume_name = volume_file_name(path);
        let split_size = donor
            .volumes()
            .first()
            .map_or(0, |v| u64::from(v.split_size));

        let (probe, _) = staged.build_header(donor, &volume_name, split_size, 0, false)?;
        let data_base = align_up(u64::from(probe.header_size()), DATA_ALIGNMENT);
        let (header, image) =
            staged.build_header(donor, &volume_name, split_size, data_base, false)?;

        if split_size > 0 {
            let mut index = 0;
            while self.fs.exists(&split_file_path(path, index)) {
                self.fs.create(&split_file_path(path, index))?;
                index += 1;
            }
            let mut output = MultiVolumeStream::open_writable(self.fs.as_ref(), path, split_size);
            write_archive(&mut output, &image, data_base, &mut staged.data)?;
        } else {
            let mut output = self.fs.create(path)?;
            write_archive(&mut output, &image, data_base, &mut staged.data)?;
        }

        info!(
            "Wrote {} archive {} ({} entries, {} data bytes)",
            header.version(),
            path.display(),
            header.entries().len(),
            staged.data_len
        );
        Ok(header)
    }

    /// Write a headless archive: item data to `data_path`, header sections
    /// returned to the caller
    pub fn write_headless(
        &self,
        data_path: &Path,
        donor: &NefsHeader,
        items: &NefsItemList,
        progress: &NefsProgress,
    ) -> NefsResult<HeadlessOutput> {
        if !donor.version().supports_headless() {
            return Err(NefsError::InvalidHeader(format!(
                "version {} cannot be written headless",
                donor.version()
            )));
        }

        let mut staged = {
            let _task = progress.begin_task(0.8, "Writing item data");
            self.stage(donor, items, progress)?
        };

        let _task = progress.begin_task(0.2, "Writing header");
        progress.check_cancelled()?;

        let volume_name = volume_file_name(data_path);
        let (header, mut image) = staged.build_header(donor, &volume_name, 0, 0, true)?;

        let mut output = self.fs.create(data_path)?;
        staged.data.seek(SeekFrom::Start(0))?;
        io::copy(&mut staged.data, &mut output)?;
        output.flush()?;

        let base = header.meta().secondary_base.unwrap_or(header.header_size()) as usize;
        let secondary = image.split_off(base.min(image.len()));
        info!(
            "Wrote headless {} archive data {} (primary {} bytes, secondary {} bytes)",
            header.version(),
            data_path.display(),
            image.len(),
            secondary.len()
        );

        Ok(HeadlessOutput {
            header,
            primary: image,
            secondary,
        })
    }

    fn stage(
        &self,
        donor: &NefsHeader,
        items: &NefsItemList,
        progress: &NefsProgress,
    ) -> NefsResult<StagedArchive> {
        let version = donor.version();
        let kept = kept_items(items)?;
        let renumber: HashMap<u32, u32> = kept
            .iter()
            .enumerate()
            .map(|(index, item)| (item.id, index as u32))
            .collect();

        let chunk_size = self.archive_chunk_size(donor, version, &kept)?;
        let aes_key = archive_aes_key(donor, version, &kept)?;
        let hash_block_size = donor
            .toc_info()
            .hash_block_size
            .filter(|&size| size > 0)
            .unwrap_or(self.config.hash_block_size);

        let mut data = tempfile::tempfile()?;
        let mut chunks = Vec::new();
        let mut placed: Vec<(NefsItem, PlacedItem)> = Vec::with_capacity(kept.len());
        let mut owners: HashMap<u32, usize> = HashMap::new();
        let mut position = 0u64;

        for (index, item) in kept.iter().enumerate() {
            progress.check_cancelled()?;

            let new_id = index as u32;
            let parent = renumber.get(&item.directory_id).copied().unwrap_or(new_id);

            if let Some(owner_id) = item.duplicate_of.filter(|_| !item.is_directory()) {
                let owner_index = renumber
                    .get(&owner_id)
                    .and_then(|id| owners.get(id))
                    .copied()
                    .ok_or_else(|| {
                        NefsError::ItemNotFound(format!(
                            "item {} duplicates item {owner_id}, which is missing or later in the list",
                            item.id
                        ))
                    })?;
                let owner = placed[owner_index].1.clone();
                placed.push((
                    (*item).clone(),
                    PlacedItem {
                        new_id,
                        parent: owner.parent,
                        ..owner
                    },
                ));
                continue;
            }

            owners.insert(new_id, placed.len());
            let mut entry = PlacedItem {
                new_id,
                parent,
                owner: new_id,
                data_offset: 0,
                first_block: NO_BLOCKS,
                extracted_size: 0,
                transform: ChunkTransform::NONE,
                has_chunks: false,
            };

            if !item.is_directory() {
                let transform = NefsDataTransform {
                    chunk_size,
                    aes_key: item.transform.aes_key.and(aes_key),
                    ..item.transform
                };
                let stored = self.stage_item(item, &transform, &mut data, progress)?;

                entry.data_offset = position;
                entry.extracted_size = stored.extracted_size;
                entry.transform = transform.chunk_transform();
                if !stored.chunks.is_empty() {
                    entry.first_block = chunks.len() as u32;
                    entry.has_chunks = true;
                    chunks.extend(stored.chunks.iter().map(|c| ChunkRecord {
                        end: c.cumulative_size,
                        checksum: c.checksum,
                        transform: Some(c.transform),
                    }));
                }
                position += stored.transformed_size;
            }

            placed.push(((*item).clone(), entry));
        }

        let hash_digests = if version.has_block_hashes() {
            block_digests(&mut data, position, hash_block_size, progress)?
        } else {
            Vec::new()
        };

        debug!(
            "Staged {} items, {} chunks, {position} data bytes",
            placed.len(),
            chunks.len()
        );

        Ok(StagedArchive {
            version,
            data,
            data_len: position,
            items: placed,
            chunks,
            chunk_size,
            hash_block_size,
            hash_digests,
            aes_key,
        })
    }

    fn archive_chunk_size(
        &self,
        donor: &NefsHeader,
        version: NefsVersion,
        kept: &[&NefsItem],
    ) -> NefsResult<u32> {
        let mut chosen: Option<u32> = None;
        for item in kept.iter().filter(|i| !i.is_directory() && i.duplicate_of.is_none()) {
            let transform = item.transform.chunk_transform();
            if !can_store_transform(version, transform) {
                return Err(NefsError::UnsupportedTransform {
                    version,
                    id: item.id,
                });
            }
            if !transform.is_transformed() {
                continue;
            }
            match chosen {
                None => chosen = Some(item.transform.chunk_size),
                Some(expected) if expected != item.transform.chunk_size => {
                    return Err(NefsError::InconsistentChunkSize {
                        expected,
                        actual: item.transform.chunk_size,
                        id: item.id,
                    });
                }
                Some(_) => {}
            }
        }

        let fallback = match donor.chunk_size() {
            0 => self.config.default_chunk_size,
            size => size,
        };
        let chunk_size = chosen.unwrap_or(fallback);

        if version == NefsVersion::V010 && chunk_size != crate::header::DEFAULT_CHUNK_SIZE {
            let id = kept
                .iter()
                .find(|i| i.transform.is_transformed())
                .map_or(0, |i| i.id);
            return Err(NefsError::InconsistentChunkSize {
                expected: crate::header::DEFAULT_CHUNK_SIZE,
                actual: chunk_size,
                id,
            });
        }
        if chunk_size == 0 {
            return Err(NefsError::InvalidHeader("chunk size is zero".to_string()));
        }
        Ok(chunk_size)
    }

    /// Write one item's stored bytes to the staging file
    fn stage_item(
        &self,
        item: &NefsItem,
        transform: &NefsDataTransform,
        data: &mut File,
        progress: &NefsProgress,
    ) -> NefsResult<StoredItem> {
        if item.state == NefsItemState::Unchanged
            && let NefsDataSource::Archive {
                volume_path,
                split_size,
                offset,
                transformed_size,
                chunks,
            } = &item.source
            && stored_transform_matches(chunks, transform)
        {
            let mut volume = MultiVolumeStream::open(self.fs.as_ref(), volume_path, *split_size);
            volume.seek(SeekFrom::Start(*offset))?;
            let copied = io::copy(&mut (&mut volume).take(*transformed_size), data)?;
            if copied != *transformed_size {
                return Err(NefsError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "item {} data ended after {copied} of {transformed_size} bytes",
                        item.id
                    ),
                )));
            }
            return Ok(StoredItem {
                chunks: chunks.clone(),
                transformed_size: *transformed_size,
                extracted_size: item.extracted_size,
            });
        }

        let (mut plain, extracted_size): (Box<dyn Read>, u64) = match &item.source {
            NefsDataSource::None => return Err(NefsError::MissingDataSource(item.id)),
            NefsDataSource::Memory(bytes) => {
                (Box::new(Cursor::new(bytes.to_vec())), bytes.len() as u64)
            }
            NefsDataSource::File(path) => {
                if !self.fs.exists(path) {
                    return Err(NefsError::SourceFileNotFound(path.clone()));
                }
                let len = self.fs.file_len(path)?;
                (Box::new(self.fs.open_read(path)?), len)
            }
            NefsDataSource::Archive {
                volume_path,
                split_size,
                offset,
                chunks,
                ..
            } => {
                let mut volume =
                    MultiVolumeStream::open(self.fs.as_ref(), volume_path, *split_size);
                let mut bytes = Vec::new();
                detransform_item(
                    &mut volume,
                    *offset,
                    item.extracted_size,
                    chunks,
                    &item.transform,
                    &mut bytes,
                    progress,
                )?;
                let len = bytes.len() as u64;
                (Box::new(Cursor::new(bytes)), len)
            }
        };

        let stored = transform_item(&mut plain, extracted_size, transform, data, progress)?;
        Ok(StoredItem {
            chunks: stored.chunks,
            transformed_size: stored.transformed_size,
            extracted_size,
        })
    }
}

#[derive(Debug)]
struct StoredItem {
    chunks: Vec<NefsDataChunk>,
    transformed_size: u64,
    extracted_size: u64,
}

/// Whether stored chunks can be copied verbatim for the target transform
fn stored_transform_matches(chunks: &[NefsDataChunk], transform: &NefsDataTransform) -> bool {
    let target = transform.chunk_transform();
    match chunks.first() {
        None => !target.is_transformed(),
        Some(_) => chunks.iter().all(|c| c.transform == target) && target.is_transformed(),
    }
}

/// Items that survive the write, in id order
fn kept_items(items: &NefsItemList) -> NefsResult<Vec<&NefsItem>> {
    let mut kept = Vec::new();
    for item in items.iter() {
        if item.state == NefsItemState::Removed {
            continue;
        }

        let parent = items
            .get(item.directory_id)
            .ok_or_else(|| NefsError::ItemNotFound(format!("parent {}", item.directory_id)))?;
        if parent.state == NefsItemState::Removed {
            return Err(NefsError::RemovedItem(parent.id));
        }
        if !parent.is_directory() && parent.id != item.id {
            return Err(NefsError::InvalidHeader(format!(
                "item {} has non-directory parent {}",
                item.id, parent.id
            )));
        }
        if let Some(owner) = item.duplicate_of {
            match items.get(owner) {
                Some(o) if o.state == NefsItemState::Removed => {
                    return Err(NefsError::RemovedItem(owner));
                }
                Some(_) => {}
                None => return Err(NefsError::ItemNotFound(format!("duplicate owner {owner}"))),
            }
        }
        kept.push(item);
    }
    Ok(kept)
}

/// The single AES key the archive can carry
///
/// Every encrypted item must use the same key. With no encrypted items the
/// donor's key is kept.
fn archive_aes_key(
    donor: &NefsHeader,
    version: NefsVersion,
    kept: &[&NefsItem],
) -> NefsResult<Option<AesKey>> {
    if version == NefsVersion::V010 {
        return Ok(None);
    }

    let mut chosen: Option<AesKey> = None;
    for item in kept.iter().filter(|i| !i.is_directory() && i.duplicate_of.is_none()) {
        match (chosen, item.transform.aes_key) {
            (None, Some(key)) => chosen = Some(key),
            (Some(existing), Some(key)) if existing != key => {
                return Err(NefsError::InvalidHeader(format!(
                    "item {} is encrypted with a different AES key than earlier items",
                    item.id
                )));
            }
            _ => {}
        }
    }
    Ok(chosen.or_else(|| donor.aes_key()))
}

fn volume_file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn block_digests(
    data: &mut File,
    len: u64,
    block_size: u32,
    progress: &NefsProgress,
) -> NefsResult<Vec<Sha256Hash>> {
    let block_size = u64::from(block_size.max(1));
    let mut digests = Vec::with_capacity(len.div_ceil(block_size) as usize);
    let mut buffer = Vec::new();

    data.seek(SeekFrom::Start(0))?;
    let mut remaining = len;
    while remaining > 0 {
        progress.check_cancelled()?;
        let take = remaining.min(block_size);
        buffer.resize(take as usize, 0);
        data.read_exact(&mut buffer)?;
        digests.push(Sha256Hash::from_data(&buffer));
        remaining -= take;
    }
    Ok(digests)
}

fn write_archive<W: Write + Seek>(
    output: &mut W,
    image: &[u8],
    data_base: u64,
    data: &mut File,
) -> NefsResult<()> {
    output.seek(SeekFrom::Start(0))?;
    output.write_all(image)?;
    let padding = data_base.saturating_sub(image.len() as u64);
    io::copy(&mut io::repeat(0).take(padding), output)?;

    data.seek(SeekFrom::Start(0))?;
    io::copy(data, output)?;
    output.flush()?;
    Ok(())
}

impl StagedArchive {
    /// Assemble normalized tables and build the header
    fn build_header(
        &self,
        donor: &NefsHeader,
        volume_name: &str,
        split_size: u64,
        data_base: u64,
        headless: bool,
    ) -> NefsResult<(NefsHeader, Vec<u8>)> {
        let mut names = NameTableBuilder::new();
        let mut shared_infos = Vec::new();
        let mut shared_index: HashMap<u32, u32> = HashMap::new();

        // Children of each directory, in ascending id order; roots are not chained
        let mut children: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for (_, placed) in self.items.iter().filter(|(_, p)| p.owner == p.new_id) {
            if placed.parent != placed.new_id {
                children.entry(placed.parent).or_default().push(placed.new_id);
            }
        }
        let mut next_sibling: HashMap<u32, u32> = HashMap::new();
        for siblings in children.values() {
            for pair in siblings.windows(2) {
                next_sibling.insert(pair[0], pair[1]);
            }
        }

        let renumber: HashMap<u32, u32> = self
            .items
            .iter()
            .map(|(item, placed)| (item.id, placed.new_id))
            .collect();

        for (item, placed) in self.items.iter().filter(|(_, p)| p.owner == p.new_id) {
            let id = placed.new_id;
            let extracted_size = u32::try_from(placed.extracted_size).map_err(|_| {
                NefsError::InvalidHeader(format!("item {} is larger than 4 GiB", item.id))
            })?;
            let patched_entry = match item.patched_entry {
                Some(target) => renumber.get(&target).copied().unwrap_or_else(|| {
                    warn!("Item {} patches removed item {target}", item.id);
                    id
                }),
                None => id,
            };

            shared_index.insert(id, shared_infos.len() as u32);
            shared_infos.push(TocSharedInfo {
                owner: id,
                parent: placed.parent,
                first_child: children
                    .get(&id)
                    .and_then(|c| c.first().copied())
                    .unwrap_or(id),
                name_offset: names.add(&item.name),
                extracted_size,
                next_sibling: next_sibling.get(&id).copied().unwrap_or(id),
                patched_entry,
            });
        }
        let volume_name_offset = names.add(volume_name);

        let mut next_duplicate: HashMap<u32, u32> = HashMap::new();
        let mut last_of_owner: HashMap<u32, u32> = HashMap::new();
        for (_, placed) in &self.items {
            if let Some(previous) = last_of_owner.insert(placed.owner, placed.new_id) {
                next_duplicate.insert(previous, placed.new_id);
            }
        }

        let mut entries = Vec::with_capacity(self.items.len());
        for (item, placed) in &self.items {
            let id = placed.new_id;
            let shared = shared_index.get(&placed.owner).copied().ok_or_else(|| {
                NefsError::InvalidHeader(format!("item {} has no shared info", item.id))
            })?;
            let is_directory = item.is_directory();

            let mut flags = EntryFlags::new(item.flags.value & !STRUCTURAL_FLAGS);
            flags.set(EntryFlags::DIRECTORY, is_directory);
            flags.set(EntryFlags::DUPLICATED, placed.owner != id);
            flags.set(EntryFlags::TRANSFORMED, placed.has_chunks);
            flags.set(EntryFlags::DEFLATE, placed.has_chunks && placed.transform.deflate);
            flags.set(EntryFlags::LZSS, placed.has_chunks && placed.transform.lzss);
            flags.set(EntryFlags::AES, placed.has_chunks && placed.transform.aes);
            let info = &shared_infos[shared as usize];
            flags.set(EntryFlags::LAST_SIBLING, info.next_sibling == info.owner);
            flags.set(EntryFlags::PATCHED, info.patched_entry != info.owner);

            entries.push(TocEntry {
                id,
                data_offset: if is_directory {
                    0
                } else {
                    data_base + placed.data_offset
                },
                shared_index: shared,
                first_block: placed.first_block,
                next_duplicate: next_duplicate.get(&id).copied().unwrap_or(id),
                volume: 0,
                flags,
            });
        }

        let split_size = u32::try_from(split_size)
            .map_err(|_| NefsError::InvalidHeader("split size exceeds 4 GiB".to_string()))?;
        let tables = HeaderTables {
            entries,
            shared_infos,
            names: names.build(),
            chunks: self.chunks.clone(),
            volumes: vec![TocVolume {
                size: data_base + self.data_len,
                name_offset: volume_name_offset,
                split_size,
            }],
            hash_digests: self.hash_digests.clone(),
            chunk_size: self.chunk_size,
            hash_block_size: self.hash_block_size,
        };

        let mut template = donor.intro().clone();
        template.set_aes_key(self.aes_key.as_ref());

        NefsHeader::build(self.version, &template, &tables, donor.endian(), headless)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::item::NefsItem;
    use binrw::Endian;

    fn memory(bytes: &[u8]) -> NefsDataSource {
        NefsDataSource::Memory(Arc::new(bytes.to_vec()))
    }

    #[test]
    fn test_transform_support_per_version() {
        let lzss = ChunkTransform {
            lzss: true,
            ..ChunkTransform::NONE
        };
        let aes = ChunkTransform {
            aes: true,
            ..ChunkTransform::NONE
        };
        let both = ChunkTransform {
            deflate: true,
            lzss: true,
            aes: false,
        };

        assert!(!can_store_transform(NefsVersion::V010, aes));
        assert!(can_store_transform(NefsVersion::V130, aes));
        assert!(!can_store_transform(NefsVersion::V130, lzss));
        assert!(can_store_transform(NefsVersion::V150, both));
        assert!(!can_store_transform(NefsVersion::V160, both));
        assert!(can_store_transform(NefsVersion::V200, both));
    }

    #[test]
    fn test_removed_parent_is_rejected() {
        let mut items = NefsItemList::new();
        let d = items.add_directory(None, "d").unwrap();
        items
            .add_file(Some(d), "a", memory(b"a"), NefsDataTransform::default())
            .unwrap();
        items.get_mut(d).unwrap().state = NefsItemState::Removed;

        let result = kept_items(&items);
        assert!(matches!(result, Err(NefsError::RemovedItem(0))));
    }

    #[test]
    fn test_missing_data_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut items = NefsItemList::new();
        items.insert(NefsItem::file(
            0,
            0,
            "lost.bin",
            10,
            NefsDataSource::None,
            NefsDataTransform::default(),
        ));

        let donor = NefsHeader::empty(NefsVersion::V200, Endian::Little);
        let result = NefsWriter::default().write(
            &dir.path().join("out.nefs"),
            &donor,
            &items,
            &NefsProgress::none(),
        );
        assert!(matches!(result, Err(NefsError::MissingDataSource(0))));
    }

    #[test]
    fn test_inconsistent_chunk_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let mut items = NefsItemList::new();
        items
            .add_file(None, "a", memory(b"aaaa"), NefsDataTransform::new(64).with_deflate())
            .unwrap();
        items
            .add_file(None, "b", memory(b"bbbb"), NefsDataTransform::new(128).with_deflate())
            .unwrap();

        let donor = NefsHeader::empty(NefsVersion::V200, Endian::Little);
        let result = NefsWriter::default().write(
            &dir.path().join("out.nefs"),
            &donor,
            &items,
            &NefsProgress::none(),
        );
        assert!(matches!(
            result,
            Err(NefsError::InconsistentChunkSize {
                expected: 64,
                actual: 128,
                id: 1
            })
        ));
    }

    #[test]
    fn test_unsupported_transform() {
        let dir = tempfile::tempdir().unwrap();
        let mut items = NefsItemList::new();
        items
            .add_file(None, "a", memory(b"aaaa"), NefsDataTransform::default().with_lzss())
            .unwrap();

        let donor = NefsHeader::empty(NefsVersion::V130, Endian::Little);
        let result = NefsWriter::default().write(
            &dir.path().join("out.nefs"),
            &donor,
            &items,
            &NefsProgress::none(),
        );
        assert!(matches!(
            result,
            Err(NefsError::UnsupportedTransform {
                version: NefsVersion::V130,
                id: 0
            })
        ));
    }

    #[test]
    fn test_headless_requires_secondary_section() {
        let dir = tempfile::tempdir().unwrap();
        let donor = NefsHeader::empty(NefsVersion::V151, Endian::Little);
        let result = NefsWriter::default().write_headless(
            &dir.path().join("data.bin"),
            &donor,
            &NefsItemList::new(),
            &NefsProgress::none(),
        );
        assert!(result.is_err());
    }
}
