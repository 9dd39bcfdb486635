//! Structural checks for candidate writable-table windows
//!
//! A window is the bytes of `n` writable entries followed by `m` writable
//! shared records. Nothing in an executable marks where these live, so a
//! window is accepted only when its content agrees with the primary tables
//! already read for the candidate header.

use binrw::Endian;

use crate::header::{NefsVersion, TocEntry, TocSharedInfo};
use crate::toc::{EntryFlags, FlagLayout, NO_BLOCKS, WritableShared};

/// Size of one writable entry record in 1.6.0 and 2.0.0
pub const WRITABLE_ENTRY_SIZE: usize = 4;

/// Size of one writable shared record
pub const WRITABLE_SHARED_SIZE: usize = 8;

/// Primary tables of a candidate header
#[derive(Debug, Clone)]
pub struct CandidateTables {
    /// Header version
    pub version: NefsVersion,
    /// Byte order
    pub endian: Endian,
    /// Entries from the primary section
    pub entries: Vec<TocEntry>,
    /// Shared-info records from the primary section
    pub shared_infos: Vec<TocSharedInfo>,
    /// Volume count from the ToC
    pub volume_count: u16,
}

impl CandidateTables {
    /// Byte size of the writable tables these primary tables imply
    pub fn window_size(&self) -> usize {
        self.entries.len() * WRITABLE_ENTRY_SIZE + self.shared_infos.len() * WRITABLE_SHARED_SIZE
    }

    const fn flag_layout(&self) -> FlagLayout {
        match self.version {
            NefsVersion::V160 => FlagLayout::V160,
            _ => FlagLayout::V200,
        }
    }

    fn u16_at(&self, bytes: &[u8], offset: usize) -> u16 {
        let raw = [bytes[offset], bytes[offset + 1]];
        match self.endian {
            Endian::Little => u16::from_le_bytes(raw),
            Endian::Big => u16::from_be_bytes(raw),
        }
    }

    fn u32_at(&self, bytes: &[u8], offset: usize) -> u32 {
        let raw = [
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ];
        match self.endian {
            Endian::Little => u32::from_le_bytes(raw),
            Endian::Big => u32::from_be_bytes(raw),
        }
    }

    /// Decode the writable shared records of a window
    fn shared_records(&self, window: &[u8]) -> Vec<WritableShared> {
        let base = self.entries.len() * WRITABLE_ENTRY_SIZE;
        (0..self.shared_infos.len())
            .map(|index| {
                let offset = base + index * WRITABLE_SHARED_SIZE;
                WritableShared {
                    next_sibling: self.u32_at(window, offset),
                    patched_entry: self.u32_at(window, offset + 4),
                }
            })
            .collect()
    }

    /// Whether `window` holds this candidate's writable tables
    pub fn accepts(&self, window: &[u8]) -> bool {
        if window.len() != self.window_size() {
            return false;
        }

        let entry_count = self.entries.len();
        let layout = self.flag_layout();
        let shared = self.shared_records(window);

        // Shared records first: they are cheap and reject most windows
        for (record, info) in shared.iter().zip(&self.shared_infos) {
            let owner = info.owner;

            // (h) patched entry in range
            if record.patched_entry as usize >= entry_count {
                return false;
            }

            // (g) next sibling is the owner or a sibling under the same parent
            if record.next_sibling != owner {
                let Some(sibling) = self.entries.get(record.next_sibling as usize) else {
                    return false;
                };
                let same_parent = self
                    .shared_infos
                    .get(sibling.shared_index as usize)
                    .is_some_and(|s| s.parent == info.parent);
                if !same_parent {
                    return false;
                }
            }
        }

        let mut directories = vec![false; entry_count];
        for (index, entry) in self.entries.iter().enumerate() {
            let offset = index * WRITABLE_ENTRY_SIZE;
            let volume = self.u16_at(window, offset);
            let raw_flags = self.u16_at(window, offset + 2);

            // (a) volume index in range
            if volume >= self.volume_count {
                return false;
            }

            // (b) only the version's flag bits
            if raw_flags & !layout.valid_mask != 0 {
                return false;
            }

            let flags = layout.decode(raw_flags);
            let has_chunks = entry.first_block != NO_BLOCKS;

            // (c) directories have no chunks
            if flags.is_directory() && has_chunks {
                return false;
            }

            // (d) transformed exactly when chunks exist
            if flags.has(EntryFlags::TRANSFORMED) != has_chunks {
                return false;
            }

            let Some(info) = self.shared_infos.get(entry.shared_index as usize) else {
                return false;
            };

            // (e) duplicated exactly when not the owner
            if flags.is_duplicated() != (info.owner != index as u32) {
                return false;
            }

            // (i) 1.6.0 last-sibling flag matches the sibling chain
            if self.version == NefsVersion::V160 {
                let next = shared
                    .get(entry.shared_index as usize)
                    .map_or(info.owner, |s| s.next_sibling);
                if flags.has(EntryFlags::LAST_SIBLING) != (next == info.owner) {
                    return false;
                }
            }

            directories[index] = flags.is_directory();
        }

        // (f) only directories have children
        self.shared_infos.iter().all(|info| {
            info.first_child == info.owner
                || directories.get(info.owner as usize).copied().unwrap_or(false)
        })
    }
}
