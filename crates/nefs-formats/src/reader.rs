//! Archive reader
//!
//! Reading decodes the header (plain, XOR or RSA + AES), parses its tables
//! with the layout of its version, checks the header hash and turns the
//! tables into an item list whose data sources point back into the archive
//! volumes.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nefs_crypto::RsaKeyStore;
use tracing::{debug, info, warn};

use crate::archive::{NefsArchive, NefsArchiveSource};
use crate::config::NefsConfig;
use crate::fs::{FileSystem, StdFileSystem, VolumeFile};
use crate::header::crypto::{DecodedHeader, check_hash, decode_intro};
use crate::header::intro::INTRO_SIZE;
use crate::header::{HeaderMeta, NefsHeader, NefsInjectHeader, TocVolume};
use crate::item::{NefsDataSource, NefsItem, NefsItemList, NefsItemState, NefsItemType};
use crate::progress::NefsProgress;
use crate::toc::{EntryFlags, NO_BLOCKS};
use crate::transform::{ChunkTransform, NefsDataChunk, NefsDataTransform};
use crate::{NefsError, NefsResult};

/// Reads archives from any supported source
pub struct NefsReader {
    fs: Arc<dyn FileSystem>,
    config: NefsConfig,
    keys: RsaKeyStore,
}

impl std::fmt::Debug for NefsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NefsReader")
            .field("config", &self.config)
            .field("keys", &self.keys.len())
            .finish_non_exhaustive()
    }
}

impl Default for NefsReader {
    fn default() -> Self {
        Self {
            fs: Arc::new(StdFileSystem),
            config: NefsConfig::default(),
            keys: RsaKeyStore::empty(),
        }
    }
}

impl NefsReader {
    /// Create a reader on the local file system
    ///
    /// Loads the RSA key list named by the configuration, if any.
    pub fn new(config: NefsConfig) -> NefsResult<Self> {
        Self::with_file_system(config, Arc::new(StdFileSystem))
    }

    /// Create a reader on a custom file system
    pub fn with_file_system(config: NefsConfig, fs: Arc<dyn FileSystem>) -> NefsResult<Self> {
        let mut keys = RsaKeyStore::empty();
        if let Some(path) = &config.rsa_key_file {
            let mut content = String::new();
            fs.open_read(path)?.read_to_string(&mut content)?;
            let loaded = keys.load_from_txt(&content);
            info!("Loaded {loaded} RSA keys from {}", path.display());
        }
        Ok(Self { fs, config, keys })
    }

    /// Replace the RSA key store
    #[must_use]
    pub fn with_keys(mut self, keys: RsaKeyStore) -> Self {
        self.keys = keys;
        self
    }

    /// Known RSA keys
    pub const fn keys(&self) -> &RsaKeyStore {
        &self.keys
    }

    /// Mutable RSA key store
    pub fn keys_mut(&mut self) -> &mut RsaKeyStore {
        &mut self.keys
    }

    /// Reader configuration
    pub const fn config(&self) -> &NefsConfig {
        &self.config
    }

    /// File system used for every access
    pub fn file_system(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.fs)
    }

    /// Read an archive
    pub fn read(
        &self,
        source: &NefsArchiveSource,
        progress: &NefsProgress,
    ) -> NefsResult<NefsArchive> {
        let header = {
            let _task = progress.begin_task(0.5, "Reading header");
            self.read_header(source, progress)?
        };

        let items = {
            let _task = progress.begin_task(0.5, "Building item list");
            let data_path = source.data_path();
            build_items(&header, data_path, progress)?
        };

        info!(
            "Opened {} archive {} with {} items",
            header.version(),
            source.data_path().display(),
            items.len()
        );

        Ok(NefsArchive::from_parts(
            header,
            items,
            source.clone(),
            Arc::clone(&self.fs),
        ))
    }

    /// Read and parse only the header of an archive
    pub fn read_header(
        &self,
        source: &NefsArchiveSource,
        progress: &NefsProgress,
    ) -> NefsResult<NefsHeader> {
        progress.check_cancelled()?;

        let (decoded, secondary_base) = match source {
            NefsArchiveSource::Standard { path } => {
                let mut file = self.fs.open_read(path)?;
                (self.decode_at(&mut file, 0)?, None)
            }
            NefsArchiveSource::Headless {
                header_path,
                primary_offset,
                primary_size,
                secondary_offset,
                secondary_size,
                ..
            } => {
                let mut file = self.fs.open_read(header_path)?;
                let primary = read_exact_at(&mut file, *primary_offset, *primary_size as usize)?;
                let secondary =
                    read_exact_at(&mut file, *secondary_offset, *secondary_size as usize)?;
                (self.decode_sections(primary, &secondary)?, Some(*primary_size))
            }
            NefsArchiveSource::Inject { inject_path, .. } => {
                let mut file = self.fs.open_read(inject_path)?;
                let inject = NefsInjectHeader::read_from(&mut file)?;
                let (primary, secondary) = inject.read_sections(&mut file)?;
                (
                    self.decode_sections(primary, &secondary)?,
                    Some(inject.primary_size),
                )
            }
        };

        progress.check_cancelled()?;

        let meta = HeaderMeta {
            endian: decoded.endian,
            encoding: decoded.encoding.clone(),
            is_hash_valid: true,
            secondary_base,
        };
        let mut header = NefsHeader::parse(&decoded.image, meta)?;

        if header.version().has_header_hash() && self.config.verify_header_hash {
            let valid = check_hash(&header.intro().hash, &decoded.computed_hash);
            header.meta_mut().is_hash_valid = valid;
        }

        debug!(
            "Header {} ({:?}, {:?}), {} bytes",
            header.version(),
            header.endian(),
            header.meta().encoding,
            header.header_size()
        );
        Ok(header)
    }

    fn decode_at(&self, file: &mut Box<dyn VolumeFile>, offset: u64) -> NefsResult<DecodedHeader> {
        let mut raw = [0u8; INTRO_SIZE];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut raw)?;

        let intro = decode_intro(&raw, &self.keys)?;
        let body = read_up_to(file, offset + INTRO_SIZE as u64, intro.body_read_len())?;
        intro.finish(body)
    }

    fn decode_sections(&self, primary: Vec<u8>, secondary: &[u8]) -> NefsResult<DecodedHeader> {
        let raw: [u8; INTRO_SIZE] = primary
            .get(..INTRO_SIZE)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| NefsError::InvalidHeader("primary section shorter than intro".into()))?;

        let intro = decode_intro(&raw, &self.keys)?;
        let mut body = primary;
        body.drain(..INTRO_SIZE);
        body.extend_from_slice(secondary);
        intro.finish(body)
    }
}

fn read_exact_at<R: Read + Seek>(reader: &mut R, offset: u64, len: usize) -> NefsResult<Vec<u8>> {
    let mut buffer = vec![0u8; len];
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Read up to `len` bytes, stopping early at end of file
fn read_up_to<R: Read + Seek>(reader: &mut R, offset: u64, len: usize) -> NefsResult<Vec<u8>> {
    let mut buffer = Vec::with_capacity(len);
    reader.seek(SeekFrom::Start(offset))?;
    reader.take(len as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Path of a volume file
///
/// Volume 0 is the archive (or data file) itself; other volumes are named in
/// the name table and live next to it.
pub fn volume_path(data_path: &Path, volume: u16, volume_name: Option<&str>) -> PathBuf {
    if volume == 0 {
        return data_path.to_path_buf();
    }
    let name = volume_name.map_or_else(|| format!("volume_{volume}"), str::to_string);
    match data_path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Turn header tables into items
pub fn build_items(
    header: &NefsHeader,
    data_path: &Path,
    progress: &NefsProgress,
) -> NefsResult<NefsItemList> {
    let entries = header.entries();
    let shared_infos = header.shared_infos();
    let chunk_records = header.chunk_records();
    let volumes: Vec<TocVolume> = header.volumes();
    let names = header.names();
    let chunk_size = header.chunk_size();
    let key = header.aes_key();

    let mut items = NefsItemList::new();

    for entry in &entries {
        if entry.id % 256 == 0 {
            progress.check_cancelled()?;
        }

        let Some(shared) = shared_infos.get(entry.shared_index as usize) else {
            warn!(
                "Entry {} references missing shared info {}; skipping it",
                entry.id, entry.shared_index
            );
            continue;
        };

        let name = names.get(shared.name_offset).unwrap_or_else(|| {
            warn!("Entry {} has no name at offset {}", entry.id, shared.name_offset);
            format!("entry_{}", entry.id)
        });
        let is_directory = entry.flags.is_directory();

        let mut chunks = Vec::new();
        if !is_directory && entry.first_block != NO_BLOCKS && chunk_size > 0 {
            let count = u64::from(shared.extracted_size).div_ceil(u64::from(chunk_size)) as usize;
            let first = entry.first_block as usize;
            let end = first.saturating_add(count).min(chunk_records.len());
            if end - first.min(end) < count {
                warn!(
                    "Entry {} expects {count} chunk records from {first}, table has {}",
                    entry.id,
                    chunk_records.len()
                );
            }

            let fallback = ChunkTransform {
                deflate: entry.flags.has(EntryFlags::DEFLATE),
                lzss: entry.flags.has(EntryFlags::LZSS),
                aes: entry.flags.has(EntryFlags::AES),
            };
            let mut previous = 0u32;
            for record in chunk_records.get(first..end).unwrap_or_default() {
                chunks.push(NefsDataChunk {
                    size: record.end.saturating_sub(previous),
                    cumulative_size: record.end,
                    checksum: record.checksum,
                    transform: record.transform.unwrap_or(fallback),
                });
                previous = record.end;
            }
        }

        let transform = chunks.first().map_or_else(
            || NefsDataTransform::new(chunk_size),
            |chunk| NefsDataTransform::from_chunk(chunk_size, chunk.transform, key),
        );
        if chunks.first().is_some_and(|c| c.transform.aes) && key.is_none() {
            warn!("Entry {} is encrypted but the header has no AES key", entry.id);
        }

        let volume = volumes.get(usize::from(entry.volume));
        let volume_name = volume.and_then(|v| names.get(v.name_offset));
        let source = if is_directory {
            NefsDataSource::None
        } else {
            let transformed_size = chunks
                .last()
                .map_or(u64::from(shared.extracted_size), |c| {
                    u64::from(c.cumulative_size)
                });
            NefsDataSource::Archive {
                volume_path: volume_path(data_path, entry.volume, volume_name.as_deref()),
                split_size: volume.map_or(0, |v| u64::from(v.split_size)),
                offset: entry.data_offset,
                transformed_size,
                chunks,
            }
        };

        let owner = shared.owner;
        let item = NefsItem {
            id: entry.id,
            directory_id: shared.parent,
            name,
            item_type: if is_directory {
                NefsItemType::Directory
            } else {
                NefsItemType::File
            },
            extracted_size: u64::from(shared.extracted_size),
            transform,
            source,
            duplicate_of: (owner != entry.id).then_some(owner),
            volume: entry.volume,
            flags: entry.flags,
            patched_entry: (shared.patched_entry != owner).then_some(shared.patched_entry),
            state: NefsItemState::Unchanged,
        };
        items.insert(item);
    }

    Ok(items)
}
