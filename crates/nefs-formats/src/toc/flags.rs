//! Entry flags
//!
//! Every version packs a different set of meanings into the writable
//! entry flag field. [`EntryFlags`] holds the union of all meanings; each
//! version supplies a [`FlagLayout`] that maps its raw bits onto it. Raw bits
//! a layout does not know are kept above bit 16 so they survive a rewrite.

/// Version-independent entry flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntryFlags {
    /// Normalized flag value; bits 16 and up hold unmapped raw bits
    pub value: u32,
}

impl EntryFlags {
    /// No flags
    pub const NONE: u32 = 0x0000;

    /// Chunks are deflate-compressed (pre-1.6.0)
    pub const DEFLATE: u32 = 0x0001;

    /// Chunks are AES-encrypted (pre-1.6.0)
    pub const AES: u32 = 0x0002;

    /// Entry is a directory
    pub const DIRECTORY: u32 = 0x0004;

    /// Entry shares data with an earlier entry
    pub const DUPLICATED: u32 = 0x0008;

    /// Entry is the last in its sibling chain
    pub const LAST_SIBLING: u32 = 0x0010;

    /// Entry may be cached by the engine
    pub const CACHEABLE: u32 = 0x0020;

    /// Chunks are LZSS-compressed (1.5.x)
    pub const LZSS: u32 = 0x0040;

    /// Entry patches another entry
    pub const PATCHED: u32 = 0x0080;

    /// Entry has chunk records (1.6.0+)
    pub const TRANSFORMED: u32 = 0x0100;

    const UNMAPPED_SHIFT: u32 = 16;

    /// Create from a normalized value
    pub const fn new(value: u32) -> Self {
        Self { value }
    }

    /// Check a normalized flag
    pub const fn has(&self, flag: u32) -> bool {
        self.value & flag == flag
    }

    /// Set or clear a normalized flag
    pub const fn set(&mut self, flag: u32, enabled: bool) {
        if enabled {
            self.value |= flag;
        } else {
            self.value &= !flag;
        }
    }

    /// Builder-style [`set`](Self::set)
    #[must_use]
    pub const fn with(mut self, flag: u32, enabled: bool) -> Self {
        self.set(flag, enabled);
        self
    }

    /// Directory flag
    pub const fn is_directory(&self) -> bool {
        self.has(Self::DIRECTORY)
    }

    /// Duplicate flag
    pub const fn is_duplicated(&self) -> bool {
        self.has(Self::DUPLICATED)
    }

    /// Raw bits the version layout could not map
    pub const fn unmapped(&self) -> u16 {
        (self.value >> Self::UNMAPPED_SHIFT) as u16
    }

    /// Replace the preserved unmapped raw bits
    pub const fn set_unmapped(&mut self, raw: u16) {
        self.value = (self.value & 0xFFFF) | ((raw as u32) << Self::UNMAPPED_SHIFT);
    }
}

/// Mapping between raw flag bits of one version and [`EntryFlags`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagLayout {
    /// (raw bit, normalized flag) pairs
    pub bits: &'static [(u16, u32)],
    /// Raw bits that may legally be set
    pub valid_mask: u16,
}

impl FlagLayout {
    /// 0.1.0 and 1.3.0
    pub const V010: Self = Self {
        bits: &[
            (0x01, EntryFlags::DEFLATE),
            (0x02, EntryFlags::AES),
            (0x04, EntryFlags::DIRECTORY),
            (0x08, EntryFlags::DUPLICATED),
            (0x10, EntryFlags::LAST_SIBLING),
        ],
        valid_mask: 0x1F,
    };

    /// 1.5.0 and 1.5.1
    pub const V150: Self = Self {
        bits: &[
            (0x01, EntryFlags::DEFLATE),
            (0x02, EntryFlags::AES),
            (0x04, EntryFlags::DIRECTORY),
            (0x08, EntryFlags::DUPLICATED),
            (0x10, EntryFlags::LAST_SIBLING),
            (0x20, EntryFlags::CACHEABLE),
            (0x40, EntryFlags::LZSS),
            (0x80, EntryFlags::PATCHED),
        ],
        valid_mask: 0xFF,
    };

    /// 1.6.0
    pub const V160: Self = Self {
        bits: &[
            (0x01, EntryFlags::TRANSFORMED),
            (0x02, EntryFlags::DIRECTORY),
            (0x04, EntryFlags::DUPLICATED),
            (0x08, EntryFlags::CACHEABLE),
            (0x10, EntryFlags::LAST_SIBLING),
            (0x20, EntryFlags::PATCHED),
        ],
        valid_mask: 0x3F,
    };

    /// 2.0.0; bits 0x20 to 0x80 are reserved but valid
    pub const V200: Self = Self {
        bits: &[
            (0x01, EntryFlags::TRANSFORMED),
            (0x02, EntryFlags::DIRECTORY),
            (0x04, EntryFlags::DUPLICATED),
            (0x08, EntryFlags::CACHEABLE),
            (0x10, EntryFlags::PATCHED),
        ],
        valid_mask: 0xFF,
    };

    /// Whether this layout can express a normalized flag
    pub fn supports(&self, flag: u32) -> bool {
        self.bits.iter().any(|&(_, normalized)| normalized == flag)
    }

    /// Map raw bits to normalized flags
    pub fn decode(&self, raw: u16) -> EntryFlags {
        let mut flags = EntryFlags::default();
        let mut unmapped = raw;
        for &(bit, normalized) in self.bits {
            if raw & bit != 0 {
                flags.set(normalized, true);
                unmapped &= !bit;
            }
        }
        flags.set_unmapped(unmapped);
        flags
    }

    /// Map normalized flags back to raw bits
    ///
    /// Normalized flags the layout cannot express are dropped.
    pub fn encode(&self, flags: EntryFlags) -> u16 {
        let mut raw = flags.unmapped();
        for &(bit, normalized) in self.bits {
            if flags.has(normalized) {
                raw |= bit;
            }
        }
        raw
    }
}
