//! Executable container detection
//!
//! Only enough of PE, ELF and Mach-O is parsed to find the file range of the
//! initialized data section, which is where games keep their embedded
//! writable header tables.

use std::ops::Range;

use binrw::Endian;

/// Executable container format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutableFormat {
    /// Windows PE/COFF
    Pe,
    /// ELF, 32- or 64-bit
    Elf,
    /// Mach-O, 32- or 64-bit
    MachO,
    /// Anything else
    Unknown,
}

const PE_DATA_SECTION: &[u8] = b".data";
const ELF_DATA_SECTION: &[u8] = b".data";
const MACHO_DATA_SEGMENT: &[u8] = b"__DATA";

const LC_SEGMENT: u32 = 0x1;
const LC_SEGMENT_64: u32 = 0x19;

fn read_u16(bytes: &[u8], offset: usize, endian: Endian) -> Option<u16> {
    let raw: [u8; 2] = bytes.get(offset..offset.checked_add(2)?)?.try_into().ok()?;
    Some(match endian {
        Endian::Little => u16::from_le_bytes(raw),
        Endian::Big => u16::from_be_bytes(raw),
    })
}

fn read_u32(bytes: &[u8], offset: usize, endian: Endian) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    Some(match endian {
        Endian::Little => u32::from_le_bytes(raw),
        Endian::Big => u32::from_be_bytes(raw),
    })
}

fn read_u64(bytes: &[u8], offset: usize, endian: Endian) -> Option<u64> {
    let raw: [u8; 8] = bytes.get(offset..offset.checked_add(8)?)?.try_into().ok()?;
    Some(match endian {
        Endian::Little => u64::from_le_bytes(raw),
        Endian::Big => u64::from_be_bytes(raw),
    })
}

/// Identify the container format of an executable image
pub fn identify(image: &[u8]) -> ExecutableFormat {
    match image.get(..4) {
        Some([b'M', b'Z', ..]) => ExecutableFormat::Pe,
        Some([0x7F, b'E', b'L', b'F']) => ExecutableFormat::Elf,
        Some(
            [0xCE | 0xCF, 0xFA, 0xED, 0xFE] | [0xFE, 0xED, 0xFA, 0xCE | 0xCF],
        ) => ExecutableFormat::MachO,
        _ => ExecutableFormat::Unknown,
    }
}

/// File range of the data section, clamped to the image
pub fn data_section_range(image: &[u8]) -> Option<Range<usize>> {
    let range = match identify(image) {
        ExecutableFormat::Pe => pe_data_section(image),
        ExecutableFormat::Elf => elf_data_section(image),
        ExecutableFormat::MachO => macho_data_segment(image),
        ExecutableFormat::Unknown => None,
    }?;

    let start = usize::try_from(range.start).ok()?.min(image.len());
    let end = usize::try_from(range.end).ok()?.min(image.len());
    (start < end).then_some(start..end)
}

fn section_name_is(raw: &[u8], name: &[u8]) -> bool {
    let trimmed = raw.split(|&b| b == 0).next().unwrap_or_default();
    trimmed == name
}

fn pe_data_section(image: &[u8]) -> Option<Range<u64>> {
    let le = Endian::Little;
    let pe = read_u32(image, 0x3C, le)? as usize;
    if image.get(pe..pe.checked_add(4)?)? != b"PE\0\0" {
        return None;
    }

    let coff = pe + 4;
    let section_count = usize::from(read_u16(image, coff + 2, le)?);
    let optional_size = usize::from(read_u16(image, coff + 16, le)?);
    let table = coff + 20 + optional_size;

    (0..section_count).find_map(|index| {
        let section = table + index * 40;
        let name = image.get(section..section + 8)?;
        if !section_name_is(name, PE_DATA_SECTION) {
            return None;
        }
        let raw_size = u64::from(read_u32(image, section + 16, le)?);
        let raw_offset = u64::from(read_u32(image, section + 20, le)?);
        Some(raw_offset..raw_offset + raw_size)
    })
}

fn elf_data_section(image: &[u8]) -> Option<Range<u64>> {
    let is_64 = match image.get(4)? {
        1 => false,
        2 => true,
        _ => return None,
    };
    let endian = match image.get(5)? {
        1 => Endian::Little,
        2 => Endian::Big,
        _ => return None,
    };

    let (shoff, shentsize, shnum, shstrndx) = if is_64 {
        (
            read_u64(image, 0x28, endian)?,
            read_u16(image, 0x3A, endian)?,
            read_u16(image, 0x3C, endian)?,
            read_u16(image, 0x3E, endian)?,
        )
    } else {
        (
            u64::from(read_u32(image, 0x20, endian)?),
            read_u16(image, 0x2E, endian)?,
            read_u16(image, 0x30, endian)?,
            read_u16(image, 0x32, endian)?,
        )
    };
    let shoff = usize::try_from(shoff).ok()?;
    let entsize = usize::from(shentsize);

    // (name offset, file offset, size)
    let section = |index: usize| -> Option<(u32, u64, u64)> {
        let base = shoff.checked_add(index.checked_mul(entsize)?)?;
        let name = read_u32(image, base, endian)?;
        if is_64 {
            Some((
                name,
                read_u64(image, base + 0x18, endian)?,
                read_u64(image, base + 0x20, endian)?,
            ))
        } else {
            Some((
                name,
                u64::from(read_u32(image, base + 0x10, endian)?),
                u64::from(read_u32(image, base + 0x14, endian)?),
            ))
        }
    };

    let (_, strtab_offset, strtab_size) = section(usize::from(shstrndx))?;
    let strtab_start = usize::try_from(strtab_offset).ok()?;
    let strtab_end = strtab_start.checked_add(usize::try_from(strtab_size).ok()?)?;
    let strtab = image.get(strtab_start..strtab_end)?;

    (0..usize::from(shnum)).find_map(|index| {
        let (name, offset, size) = section(index)?;
        let name = strtab.get(name as usize..)?;
        section_name_is(name, ELF_DATA_SECTION).then_some(offset..offset + size)
    })
}

fn macho_data_segment(image: &[u8]) -> Option<Range<u64>> {
    let (endian, is_64) = match read_u32(image, 0, Endian::Little)? {
        0xFEED_FACE => (Endian::Little, false),
        0xFEED_FACF => (Endian::Little, true),
        0xCEFA_EDFE => (Endian::Big, false),
        0xCFFA_EDFE => (Endian::Big, true),
        _ => return None,
    };

    let command_count = read_u32(image, 0x10, endian)? as usize;
    let mut offset = if is_64 { 32 } else { 28 };

    for _ in 0..command_count {
        let command = read_u32(image, offset, endian)?;
        let size = read_u32(image, offset + 4, endian)? as usize;
        let name = image.get(offset + 8..offset + 24)?;

        if section_name_is(name, MACHO_DATA_SEGMENT) {
            match command {
                LC_SEGMENT_64 => {
                    let file_offset = read_u64(image, offset + 40, endian)?;
                    let file_size = read_u64(image, offset + 48, endian)?;
                    return Some(file_offset..file_offset + file_size);
                }
                LC_SEGMENT => {
                    let file_offset = u64::from(read_u32(image, offset + 32, endian)?);
                    let file_size = u64::from(read_u32(image, offset + 36, endian)?);
                    return Some(file_offset..file_offset + file_size);
                }
                _ => {}
            }
        }

        if size == 0 {
            return None;
        }
        offset = offset.checked_add(size)?;
    }
    None
}
