//! Archive facade
//!
//! An archive pairs an immutable header snapshot with the live item list.
//! Saving never touches the snapshot; it writes a new archive and reads it
//! back so the returned archive describes exactly what is on disk.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use binrw::Endian;
use nefs_crypto::Sha256Hash;
use tracing::{debug, info, warn};

use crate::config::NefsConfig;
use crate::fs::{FileSystem, StdFileSystem};
use crate::header::inject::write_inject;
use crate::header::{NefsHeader, NefsVersion};
use crate::item::{NefsDataSource, NefsItemList};
use crate::progress::NefsProgress;
use crate::reader::NefsReader;
use crate::transform::detransform_item;
use crate::volume::MultiVolumeStream;
use crate::writer::{HeadlessOutput, NefsWriter};
use crate::{NefsError, NefsResult};

/// Where an archive's header and data live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NefsArchiveSource {
    /// Header at the start of the data file
    Standard {
        /// Archive file
        path: PathBuf,
    },
    /// Header split into two sections of another file, data in its own file
    Headless {
        /// File holding both header sections (usually an executable)
        header_path: PathBuf,
        /// Offset of the primary section
        primary_offset: u64,
        /// Size of the primary section
        primary_size: u32,
        /// Offset of the secondary (writable) section
        secondary_offset: u64,
        /// Size of the secondary section
        secondary_size: u32,
        /// Data file
        data_path: PathBuf,
    },
    /// Header sections in a NefsInject file, data in its own file
    Inject {
        /// Inject file
        inject_path: PathBuf,
        /// Data file
        data_path: PathBuf,
    },
}

impl NefsArchiveSource {
    /// Standard archive at `path`
    pub fn standard(path: impl Into<PathBuf>) -> Self {
        Self::Standard { path: path.into() }
    }

    /// NefsInject header for a separate data file
    pub fn inject(inject_path: impl Into<PathBuf>, data_path: impl Into<PathBuf>) -> Self {
        Self::Inject {
            inject_path: inject_path.into(),
            data_path: data_path.into(),
        }
    }

    /// File holding volume 0 item data
    pub fn data_path(&self) -> &Path {
        match self {
            Self::Standard { path } => path,
            Self::Headless { data_path, .. } | Self::Inject { data_path, .. } => data_path,
        }
    }

    /// Whether the header shares its file with the data
    pub const fn is_standard(&self) -> bool {
        matches!(self, Self::Standard { .. })
    }
}

/// An opened (or new) archive
pub struct NefsArchive {
    header: NefsHeader,
    items: NefsItemList,
    source: NefsArchiveSource,
    fs: Arc<dyn FileSystem>,
}

impl std::fmt::Debug for NefsArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NefsArchive")
            .field("version", &self.header.version())
            .field("source", &self.source)
            .field("items", &self.items.len())
            .finish_non_exhaustive()
    }
}

impl NefsArchive {
    pub(crate) fn from_parts(
        header: NefsHeader,
        items: NefsItemList,
        source: NefsArchiveSource,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            header,
            items,
            source,
            fs,
        }
    }

    /// Empty archive of `version`, not yet saved anywhere
    pub fn new(version: NefsVersion, endian: Endian) -> Self {
        Self::from_parts(
            NefsHeader::empty(version, endian),
            NefsItemList::new(),
            NefsArchiveSource::standard(PathBuf::new()),
            Arc::new(StdFileSystem),
        )
    }

    /// Open a standard archive with the default configuration
    pub fn open(path: impl AsRef<Path>) -> NefsResult<Self> {
        Self::open_with(
            &NefsReader::default(),
            &NefsArchiveSource::standard(path.as_ref()),
            &NefsProgress::none(),
        )
    }

    /// Open any archive source with a configured reader
    pub fn open_with(
        reader: &NefsReader,
        source: &NefsArchiveSource,
        progress: &NefsProgress,
    ) -> NefsResult<Self> {
        reader.read(source, progress)
    }

    /// Header snapshot the archive was read from
    pub const fn header(&self) -> &NefsHeader {
        &self.header
    }

    /// Header version
    pub const fn version(&self) -> NefsVersion {
        self.header.version()
    }

    /// Items
    pub const fn items(&self) -> &NefsItemList {
        &self.items
    }

    /// Mutable items
    pub fn items_mut(&mut self) -> &mut NefsItemList {
        &mut self.items
    }

    /// Where the archive was read from
    pub const fn source(&self) -> &NefsArchiveSource {
        &self.source
    }

    fn writer(&self) -> NefsWriter {
        NefsWriter::with_file_system(NefsConfig::default(), Arc::clone(&self.fs))
    }

    fn reader(&self) -> NefsResult<NefsReader> {
        NefsReader::with_file_system(NefsConfig::default(), Arc::clone(&self.fs))
    }

    /// Save as a standard archive and return the archive as written
    pub fn save(&self, dest: impl AsRef<Path>, progress: &NefsProgress) -> NefsResult<Self> {
        self.save_with(&self.writer(), dest, progress)
    }

    /// Save with a configured writer
    pub fn save_with(
        &self,
        writer: &NefsWriter,
        dest: impl AsRef<Path>,
        progress: &NefsProgress,
    ) -> NefsResult<Self> {
        let dest = dest.as_ref();
        {
            let _task = progress.begin_task(0.8, "Saving archive");
            writer.write(dest, &self.header, &self.items, progress)?;
        }

        let _task = progress.begin_task(0.2, "Reloading archive");
        self.reader()?
            .read(&NefsArchiveSource::standard(dest), progress)
    }

    /// Write item data to `data_path` and return the header sections
    ///
    /// Storing the sections (inside an executable or elsewhere) is up to the
    /// caller.
    pub fn save_headless(
        &self,
        data_path: impl AsRef<Path>,
        progress: &NefsProgress,
    ) -> NefsResult<HeadlessOutput> {
        self.writer()
            .write_headless(data_path.as_ref(), &self.header, &self.items, progress)
    }

    /// Save as a headless archive whose header ships in a NefsInject file
    pub fn save_inject(
        &self,
        inject_path: impl AsRef<Path>,
        data_path: impl AsRef<Path>,
        progress: &NefsProgress,
    ) -> NefsResult<Self> {
        let inject_path = inject_path.as_ref();
        let data_path = data_path.as_ref();

        let output = {
            let _task = progress.begin_task(0.8, "Saving archive");
            self.save_headless(data_path, progress)?
        };

        let mut file = self.fs.create(inject_path)?;
        write_inject(&mut file, &output.primary, &output.secondary)?;
        file.flush()?;
        info!("Wrote inject header {}", inject_path.display());

        let _task = progress.begin_task(0.2, "Reloading archive");
        self.reader()?
            .read(&NefsArchiveSource::inject(inject_path, data_path), progress)
    }

    /// Stream an item's extracted bytes to `output`
    ///
    /// Returns the number of bytes written. Directories write nothing.
    pub fn extract_item<W: Write>(
        &self,
        id: u32,
        output: &mut W,
        progress: &NefsProgress,
    ) -> NefsResult<u64> {
        let item = self
            .items
            .get(id)
            .ok_or_else(|| NefsError::ItemNotFound(format!("item {id}")))?;
        if item.is_directory() {
            return Ok(0);
        }

        let written = match &item.source {
            NefsDataSource::None => return Err(NefsError::MissingDataSource(id)),
            NefsDataSource::Memory(bytes) => {
                output.write_all(bytes)?;
                bytes.len() as u64
            }
            NefsDataSource::File(path) => {
                if !self.fs.exists(path) {
                    return Err(NefsError::SourceFileNotFound(path.clone()));
                }
                io::copy(&mut self.fs.open_read(path)?, output)?
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
                detransform_item(
                    &mut volume,
                    *offset,
                    item.extracted_size,
                    chunks,
                    &item.transform,
                    output,
                    progress,
                )?
            }
        };

        debug!("Extracted item {id} ({written} bytes)");
        Ok(written)
    }

    /// Extract an item to a file, creating parent directories
    pub fn extract_to(&self, id: u32, dest: &Path, progress: &NefsProgress) -> NefsResult<u64> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs.create_dir_all(parent)?;
        }
        let mut file = self.fs.create(dest)?;
        let written = self.extract_item(id, &mut file, progress)?;
        file.flush()?;
        Ok(written)
    }

    /// Check the data region against the header's block digests
    ///
    /// Returns the indices of mismatching blocks; each mismatch is logged.
    /// Headers without digests yield an empty list.
    pub fn verify_block_hashes(&self, progress: &NefsProgress) -> NefsResult<Vec<usize>> {
        let digests = self.header.hash_digests();
        if digests.is_empty() {
            return Ok(Vec::new());
        }

        let volume = self.header.volumes().first().copied();
        let split_size = volume.map_or(0, |v| u64::from(v.split_size));
        let mut stream =
            MultiVolumeStream::open(self.fs.as_ref(), self.source.data_path(), split_size);

        let start = if self.source.is_standard() {
            self.header.data_start()
        } else {
            0
        };
        let end = match volume.map(|v| v.size).filter(|&size| size > 0) {
            Some(size) => size,
            None => stream.len()?,
        };
        if end < start {
            warn!("Volume size {end} ends before the data region at {start}");
            return Ok((0..digests.len()).collect());
        }

        let block_size = u64::from(self.header.hash_block_size());
        let mut mismatches = Vec::new();
        let mut buffer = Vec::new();
        stream.seek(SeekFrom::Start(start))?;

        for (index, expected) in digests.iter().enumerate() {
            progress.check_cancelled()?;

            let block_start = start + index as u64 * block_size;
            let len = end.saturating_sub(block_start).min(block_size);
            buffer.clear();
            (&mut stream).take(len).read_to_end(&mut buffer)?;

            if buffer.len() as u64 != len || Sha256Hash::from_data(&buffer) != *expected {
                warn!("Data block {index} does not match its header digest");
                mismatches.push(index);
            }
        }

        if mismatches.is_empty() {
            debug!("All {} data block digests match", digests.len());
        }
        Ok(mismatches)
    }
}
