//! NeFS header model
//!
//! A header is an intro, a ToC and a set of flat record tables. Six versions
//! exist; each is described by a [`HeaderLayout`] and held in a
//! [`VersionedHeader`]. [`NefsHeader`] is the sum over all six and exposes
//! normalized, version-independent views of every table.
//!
//! ```text
//! primary section:   intro | toc | entries | shared | names | chunks | volumes | digests
//! secondary section: writable entries | writable shared
//! ```
//!
//! Standard archives store both sections back to back. Headless archives
//! keep the secondary section in a separate file or location.

pub mod crypto;
pub mod inject;
pub mod intro;
pub mod layout;
pub mod tables;
pub mod toc_block;

use std::fmt;

use binrw::Endian;
use nefs_crypto::{AesKey, Sha256Hash};
use tracing::warn;

use crate::toc::{NameTable, WritableShared};
use crate::{NefsError, NefsResult};

pub use crypto::HeaderEncoding;
pub use inject::NefsInjectHeader;
pub use intro::NefsIntro;
pub use layout::{
    ChunkRecord, HeaderLayout, Layout010, Layout130, Layout150, Layout151, Layout160, Layout200,
    TocEntry, TocSharedInfo, TocVolume,
};
pub use tables::HeaderTables;
pub use toc_block::TocInfo;

use layout::{BlockRecord, EntryRecord, SharedRecord, VolumeRecord, WritableEntryRecord};
use toc_block::TocBlock;

/// Magic number, "NeFS" when stored little-endian
pub const NEFS_MAGIC: u32 = 0x5346_654E;

/// Chunk size of 0.1.0 archives and the default for new items
pub const DEFAULT_CHUNK_SIZE: u32 = 0x10000;

/// Data block size covered by one hash digest
pub const DEFAULT_HASH_BLOCK_SIZE: u32 = 0x80_0000;

/// Shift applied to the hash block size stored in the ToC
pub const HASH_BLOCK_SHIFT: u32 = 15;

/// Alignment of the data region that follows a standard header
pub const DATA_ALIGNMENT: u64 = 0x10000;

/// Supported header versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NefsVersion {
    /// 0.1.0
    V010,
    /// 1.3.0
    V130,
    /// 1.5.0
    V150,
    /// 1.5.1
    V151,
    /// 1.6.0
    V160,
    /// 2.0.0
    V200,
}

impl NefsVersion {
    /// Every supported version, oldest first
    pub const ALL: [Self; 6] = [
        Self::V010,
        Self::V130,
        Self::V150,
        Self::V151,
        Self::V160,
        Self::V200,
    ];

    /// On-disk version tag
    pub const fn tag(self) -> u32 {
        match self {
            Self::V010 => 0x0000_0100,
            Self::V130 => 0x0001_0300,
            Self::V150 => 0x0001_0500,
            Self::V151 => 0x0001_0501,
            Self::V160 => 0x0001_0600,
            Self::V200 => 0x0002_0000,
        }
    }

    /// Resolve a version tag
    pub fn from_tag(tag: u32) -> NefsResult<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.tag() == tag)
            .ok_or(NefsError::UnsupportedVersion(tag))
    }

    /// Whether headers of this version carry a hash
    pub const fn has_header_hash(self) -> bool {
        !matches!(self, Self::V010)
    }

    /// Whether headers of this version carry per-block data digests
    pub const fn has_block_hashes(self) -> bool {
        matches!(self, Self::V160 | Self::V200)
    }

    /// Whether the writable tables may live in a secondary section
    pub const fn supports_headless(self) -> bool {
        matches!(self, Self::V160 | Self::V200)
    }
}

impl fmt::Display for NefsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        write!(f, "{}.{}.{}", tag >> 16, (tag >> 8) & 0xFF, tag & 0xFF)
    }
}

/// How a header was found and decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMeta {
    /// Archive byte order
    pub endian: Endian,
    /// On-disk encoding of the header
    pub encoding: HeaderEncoding,
    /// Whether the stored hash matched (true when not checked)
    pub is_hash_valid: bool,
    /// Start of the secondary section in the header image, for split headers
    pub secondary_base: Option<u32>,
}

impl Default for HeaderMeta {
    fn default() -> Self {
        Self {
            endian: Endian::Little,
            encoding: HeaderEncoding::Plain,
            is_hash_valid: true,
            secondary_base: None,
        }
    }
}

/// Header tables in the record layout of one version
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedHeader<L: HeaderLayout> {
    /// Intro
    pub intro: NefsIntro,
    /// ToC block
    pub toc: L::Toc,
    /// Entry table
    pub entries: Vec<L::Entry>,
    /// Shared-info table
    pub shared_infos: Vec<L::Shared>,
    /// Name table
    pub names: NameTable,
    /// Chunk table
    pub blocks: Vec<L::Block>,
    /// Volume-info table
    pub volumes: Vec<L::Volume>,
    /// Writable entry table
    pub writable_entries: Vec<L::Writable>,
    /// Writable shared-info table
    pub writable_shared: Vec<WritableShared>,
    /// Hash digest table
    pub hash_digests: Vec<Sha256Hash>,
    /// Decoding details
    pub meta: HeaderMeta,
}

impl<L: HeaderLayout> VersionedHeader<L> {
    /// Empty header with no tables
    pub fn empty(endian: Endian) -> Self {
        Self {
            intro: NefsIntro {
                version: L::VERSION.tag(),
                ..NefsIntro::default()
            },
            toc: L::Toc::default(),
            entries: Vec::new(),
            shared_infos: Vec::new(),
            names: NameTable::default(),
            blocks: Vec::new(),
            volumes: Vec::new(),
            writable_entries: Vec::new(),
            writable_shared: Vec::new(),
            hash_digests: Vec::new(),
            meta: HeaderMeta {
                endian,
                ..HeaderMeta::default()
            },
        }
    }

    /// Normalized entries
    ///
    /// Layouts without a stored duplicate chain get one derived from entries
    /// sharing a shared-info record, in index order.
    pub fn toc_entries(&self) -> Vec<TocEntry> {
        let mut entries: Vec<TocEntry> = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let mut entry = record.load(index as u32);
                if let Some(writable) = self.writable_entries.get(index) {
                    entry.volume = writable.volume();
                    entry.flags = L::FLAGS.decode(writable.raw_flags());
                }
                entry
            })
            .collect();

        if !L::Entry::STORES_NEXT_DUPLICATE {
            let mut last_by_shared = std::collections::HashMap::new();
            for index in 0..entries.len() {
                let shared = entries[index].shared_index;
                if let Some(previous) = last_by_shared.insert(shared, index) {
                    entries[previous].next_duplicate = index as u32;
                }
            }
        }

        entries
    }

    /// Normalized shared-info records
    pub fn toc_shared_infos(&self) -> Vec<TocSharedInfo> {
        self.shared_infos
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let mut info = record.load();
                if let Some(writable) = self.writable_shared.get(index) {
                    info.next_sibling = writable.next_sibling;
                    info.patched_entry = writable.patched_entry;
                }
                info
            })
            .collect()
    }

    /// Normalized chunk records
    pub fn chunk_records(&self) -> Vec<ChunkRecord> {
        self.blocks.iter().map(BlockRecord::load).collect()
    }

    /// Normalized volumes
    pub fn toc_volumes(&self) -> Vec<TocVolume> {
        self.volumes.iter().map(VolumeRecord::load).collect()
    }

    /// ToC offsets and parameters
    pub fn toc_info(&self) -> TocInfo {
        self.toc.info()
    }

    /// Normalized tables
    pub fn tables(&self) -> HeaderTables {
        let info = self.toc_info();
        HeaderTables {
            entries: self.toc_entries(),
            shared_infos: self.toc_shared_infos(),
            names: self.names.clone(),
            chunks: self.chunk_records(),
            volumes: self.toc_volumes(),
            hash_digests: self.hash_digests.clone(),
            chunk_size: info.chunk_size,
            hash_block_size: info.hash_block_size.unwrap_or(DEFAULT_HASH_BLOCK_SIZE),
        }
    }
}

/// A parsed header of any supported version
#[derive(Debug, Clone, PartialEq)]
pub enum NefsHeader {
    /// 0.1.0
    V010(VersionedHeader<Layout010>),
    /// 1.3.0
    V130(VersionedHeader<Layout130>),
    /// 1.5.0
    V150(VersionedHeader<Layout150>),
    /// 1.5.1
    V151(VersionedHeader<Layout151>),
    /// 1.6.0
    V160(VersionedHeader<Layout160>),
    /// 2.0.0
    V200(VersionedHeader<Layout200>),
}

/// Evaluate an expression against the inner header of any variant
macro_rules! with_header {
    ($header:expr, $inner:ident => $body:expr) => {
        match $header {
            NefsHeader::V010($inner) => $body,
            NefsHeader::V130($inner) => $body,
            NefsHeader::V150($inner) => $body,
            NefsHeader::V151($inner) => $body,
            NefsHeader::V160($inner) => $body,
            NefsHeader::V200($inner) => $body,
        }
    };
}

/// Run a generic function with the layout type of a version
macro_rules! with_layout {
    ($version:expr, $layout:ident => $body:expr) => {
        match $version {
            NefsVersion::V010 => {
                type $layout = Layout010;
                $body
            }
            NefsVersion::V130 => {
                type $layout = Layout130;
                $body
            }
            NefsVersion::V150 => {
                type $layout = Layout150;
                $body
            }
            NefsVersion::V151 => {
                type $layout = Layout151;
                $body
            }
            NefsVersion::V160 => {
                type $layout = Layout160;
                $body
            }
            NefsVersion::V200 => {
                type $layout = Layout200;
                $body
            }
        }
    };
}

/// Wrap a versioned header in its [`NefsHeader`] variant
pub trait IntoNefsHeader {
    /// Wrap
    fn into_header(self) -> NefsHeader;
}

macro_rules! impl_into_header {
    ($($layout:ty => $variant:ident),* $(,)?) => {
        $(
            impl IntoNefsHeader for VersionedHeader<$layout> {
                fn into_header(self) -> NefsHeader {
                    NefsHeader::$variant(self)
                }
            }
        )*
    };
}

impl_into_header!(
    Layout010 => V010,
    Layout130 => V130,
    Layout150 => V150,
    Layout151 => V151,
    Layout160 => V160,
    Layout200 => V200,
);

impl NefsHeader {
    /// Empty header of a version
    pub fn empty(version: NefsVersion, endian: Endian) -> Self {
        with_layout!(version, L => VersionedHeader::<L>::empty(endian).into_header())
    }

    /// Parse a decoded header image
    ///
    /// `secondary_base` is the start of the secondary section for headers
    /// assembled from two locations.
    pub fn parse(image: &[u8], meta: HeaderMeta) -> NefsResult<Self> {
        let version_tag = intro::read_u32(image, intro::VERSION_OFFSET, meta.endian)
            .ok_or_else(|| NefsError::InvalidHeader("header shorter than its intro".into()))?;
        let version = NefsVersion::from_tag(version_tag)?;
        with_layout!(version, L => Ok(tables::read_tables::<L>(image, meta)?.into_header()))
    }

    /// Build a header of `version` from normalized tables
    ///
    /// Returns the header and its serialized image with the hash filled in.
    pub fn build(
        version: NefsVersion,
        template: &NefsIntro,
        tables: &HeaderTables,
        endian: Endian,
        headless: bool,
    ) -> NefsResult<(Self, Vec<u8>)> {
        with_layout!(version, L => {
            let (header, image) = tables::build::<L>(template, tables, endian, headless)?;
            Ok((header.into_header(), image))
        })
    }

    /// Serialize to a header image
    pub fn to_bytes(&self) -> NefsResult<Vec<u8>> {
        with_header!(self, h => tables::serialize(h))
    }

    /// Header version
    pub const fn version(&self) -> NefsVersion {
        match self {
            Self::V010(_) => NefsVersion::V010,
            Self::V130(_) => NefsVersion::V130,
            Self::V150(_) => NefsVersion::V150,
            Self::V151(_) => NefsVersion::V151,
            Self::V160(_) => NefsVersion::V160,
            Self::V200(_) => NefsVersion::V200,
        }
    }

    /// Intro block
    pub fn intro(&self) -> &NefsIntro {
        with_header!(self, h => &h.intro)
    }

    /// Decoding details
    pub fn meta(&self) -> &HeaderMeta {
        with_header!(self, h => &h.meta)
    }

    /// Mutable decoding details
    pub fn meta_mut(&mut self) -> &mut HeaderMeta {
        with_header!(self, h => &mut h.meta)
    }

    /// Archive byte order
    pub fn endian(&self) -> Endian {
        self.meta().endian
    }

    /// Whether the stored header hash matched
    pub fn is_hash_valid(&self) -> bool {
        self.meta().is_hash_valid
    }

    /// ToC offsets and parameters
    pub fn toc_info(&self) -> TocInfo {
        with_header!(self, h => h.toc_info())
    }

    /// Normalized entries
    pub fn entries(&self) -> Vec<TocEntry> {
        with_header!(self, h => h.toc_entries())
    }

    /// Normalized shared-info records
    pub fn shared_infos(&self) -> Vec<TocSharedInfo> {
        with_header!(self, h => h.toc_shared_infos())
    }

    /// Name table
    pub fn names(&self) -> &NameTable {
        with_header!(self, h => &h.names)
    }

    /// Normalized chunk records
    pub fn chunk_records(&self) -> Vec<ChunkRecord> {
        with_header!(self, h => h.chunk_records())
    }

    /// Normalized volumes
    pub fn volumes(&self) -> Vec<TocVolume> {
        with_header!(self, h => h.toc_volumes())
    }

    /// Per-block hash digests (1.6.0+)
    pub fn hash_digests(&self) -> &[Sha256Hash] {
        with_header!(self, h => &h.hash_digests)
    }

    /// All tables in normalized form
    pub fn tables(&self) -> HeaderTables {
        with_header!(self, h => h.tables())
    }

    /// Chunk size of transformed items
    pub fn chunk_size(&self) -> u32 {
        self.toc_info().chunk_size
    }

    /// Data block size covered by each hash digest
    pub fn hash_block_size(&self) -> u32 {
        self.toc_info()
            .hash_block_size
            .filter(|&size| size > 0)
            .unwrap_or(DEFAULT_HASH_BLOCK_SIZE)
    }

    /// AES key carried by the intro
    ///
    /// A malformed key is logged and treated as absent.
    pub fn aes_key(&self) -> Option<AesKey> {
        match self.intro().aes_key() {
            Ok(key) => key,
            Err(e) => {
                warn!("Ignoring malformed AES key in header intro: {e}");
                None
            }
        }
    }

    /// Header size in bytes, both sections included
    pub fn header_size(&self) -> u32 {
        self.intro().header_size
    }

    /// Where item data starts in a standard archive
    pub fn data_start(&self) -> u64 {
        align_up(u64::from(self.header_size()), DATA_ALIGNMENT)
    }
}

/// Round `value` up to a multiple of `alignment`
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}
