//! Archive items
//!
//! Items are the live, editable view of an archive. The reader builds them
//! from header tables; callers add, replace and remove them; the writer turns
//! them back into fresh tables.

pub mod list;

use std::path::PathBuf;
use std::sync::Arc;

use crate::toc::EntryFlags;
use crate::transform::{NefsDataChunk, NefsDataTransform};

pub use list::NefsItemList;

/// File or directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NefsItemType {
    /// Regular file
    File,
    /// Directory
    Directory,
}

/// Edit state of an item relative to the archive it was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NefsItemState {
    /// Unchanged since it was read
    #[default]
    Unchanged,
    /// Added after the archive was read
    Added,
    /// Data replaced after the archive was read
    Replaced,
    /// Marked for removal
    Removed,
}

/// Where an item's data comes from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NefsDataSource {
    /// No data; directories, or files that lost their source
    #[default]
    None,
    /// Stored in an existing archive volume
    Archive {
        /// Volume file (first split file for split volumes)
        volume_path: PathBuf,
        /// Split size of the volume, zero when not split
        split_size: u64,
        /// Offset of the stored data in the volume
        offset: u64,
        /// Stored (transformed) size
        transformed_size: u64,
        /// Chunk records; empty for untransformed data
        chunks: Vec<NefsDataChunk>,
    },
    /// Plain file on disk, read in full
    File(PathBuf),
    /// Plain bytes in memory
    Memory(Arc<Vec<u8>>),
}

impl NefsDataSource {
    /// Whether the data is already in transformed form
    pub const fn is_archive(&self) -> bool {
        matches!(self, Self::Archive { .. })
    }
}

/// One file or directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NefsItem {
    /// Item id; equals the entry index in the header it came from
    pub id: u32,
    /// Parent directory id; equals `id` for root items
    pub directory_id: u32,
    /// File or directory name
    pub name: String,
    /// File or directory
    pub item_type: NefsItemType,
    /// Size of the extracted data
    pub extracted_size: u64,
    /// How the data is, or will be, transformed
    pub transform: NefsDataTransform,
    /// Data source
    pub source: NefsDataSource,
    /// Id of the item whose data this one shares
    pub duplicate_of: Option<u32>,
    /// Volume index
    pub volume: u16,
    /// Entry flags carried through a rewrite (cacheable, patched, unknown bits)
    pub flags: EntryFlags,
    /// Entry patched by this item
    pub patched_entry: Option<u32>,
    /// Edit state
    pub state: NefsItemState,
}

impl NefsItem {
    /// New file item
    pub fn file(
        id: u32,
        directory_id: u32,
        name: impl Into<String>,
        extracted_size: u64,
        source: NefsDataSource,
        transform: NefsDataTransform,
    ) -> Self {
        Self {
            id,
            directory_id,
            name: name.into(),
            item_type: NefsItemType::File,
            extracted_size,
            transform,
            source,
            duplicate_of: None,
            volume: 0,
            flags: EntryFlags::default(),
            patched_entry: None,
            state: NefsItemState::Unchanged,
        }
    }

    /// New directory item
    pub fn directory(id: u32, directory_id: u32, name: impl Into<String>) -> Self {
        Self {
            item_type: NefsItemType::Directory,
            flags: EntryFlags::new(EntryFlags::DIRECTORY),
            ..Self::file(
                id,
                directory_id,
                name,
                0,
                NefsDataSource::None,
                NefsDataTransform::default(),
            )
        }
    }

    /// Whether this is a directory
    pub fn is_directory(&self) -> bool {
        self.item_type == NefsItemType::Directory
    }

    /// Whether this is a root item
    pub const fn is_root(&self) -> bool {
        self.directory_id == self.id
    }

    /// Chunk records of data stored in an archive
    pub fn chunks(&self) -> &[NefsDataChunk] {
        match &self.source {
            NefsDataSource::Archive { chunks, .. } => chunks,
            _ => &[],
        }
    }
}
