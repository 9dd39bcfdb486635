//! Executable header scanner
//!
//! Some games embed headless NeFS headers in their executable: the primary
//! section (intro, ToC, read-only tables) sits somewhere in the image and
//! the writable tables sit in the data section, with nothing pointing from
//! one to the other. The scanner finds both:
//!
//! 1. Locate the data section of the PE/ELF/Mach-O container as a search hint
//! 2. Find every occurrence of the magic number in either byte order
//! 3. Parse 1.6.0/2.0.0 intro, ToC and primary tables at each occurrence
//! 4. Largest candidate first, probe aligned windows of the implied writable
//!    size and keep the first one that passes every structural check
//!
//! Windows claimed by one candidate are never offered to another.

pub mod image;
pub mod validate;

use std::fs::File;
use std::io::Cursor;
use std::ops::Range;
use std::path::Path;

use memchr::memmem;
use memmap2::MmapOptions;
use tracing::{debug, info, warn};

use crate::archive::NefsArchiveSource;
use crate::config::NefsConfig;
use crate::header::intro::{
    ENTRY_COUNT_OFFSET, HASH_END, HASH_OFFSET, HEADER_SIZE_OFFSET, INTRO_SIZE, VERSION_OFFSET,
    detect_magic, read_u32,
};
use crate::header::tables::header_hash;
use crate::header::toc_block::{Toc160, TocBlock};
use crate::header::{HeaderMeta, NEFS_MAGIC, NefsHeader, NefsVersion, TocInfo, align_up};
use crate::progress::NefsProgress;
use crate::NefsResult;
use crate::toc::{TocCodec, TocRecord};

pub use image::{ExecutableFormat, data_section_range, identify};
pub use validate::CandidateTables;

/// Size of a shared-info record in 1.6.0 and 2.0.0
const SHARED_INFO_SIZE: usize = 20;

/// Windows probed between cancellation checks
const PROBES_PER_CHECK: usize = 0x4000;

/// A parsed header whose writable tables are still unknown
#[derive(Debug, Clone)]
struct Candidate {
    offset: usize,
    primary: Vec<u8>,
    tables: CandidateTables,
    data_file: String,
}

impl Candidate {
    fn primary_range(&self) -> Range<usize> {
        self.offset..self.offset + self.primary.len()
    }
}

/// Find the headless archives embedded in an executable
///
/// Data files are expected in `data_dir` under the names the headers give.
pub fn discover_headers(
    exe_path: &Path,
    data_dir: &Path,
    config: &NefsConfig,
    progress: &NefsProgress,
) -> NefsResult<Vec<NefsArchiveSource>> {
    let file = File::open(exe_path)?;
    if file.metadata()?.len() == 0 {
        return Ok(Vec::new());
    }

    // Read-only mapping, dropped before returning
    #[allow(unsafe_code)]
    let map = unsafe { MmapOptions::new().map(&file)? };

    discover_in_image(&map, exe_path, data_dir, config, progress)
}

/// Find the headless archives embedded in an in-memory executable image
pub fn discover_in_image(
    image: &[u8],
    exe_path: &Path,
    data_dir: &Path,
    config: &NefsConfig,
    progress: &NefsProgress,
) -> NefsResult<Vec<NefsArchiveSource>> {
    let format = identify(image);
    let hint = data_section_range(image).unwrap_or(0..image.len());
    debug!(
        "Scanning {} ({format:?}, {} bytes), writable tables searched in {hint:?}",
        exe_path.display(),
        image.len()
    );

    let mut candidates = {
        let _task = progress.begin_task(0.3, "Finding header candidates");
        let mut candidates = Vec::new();
        for offset in magic_offsets(image) {
            progress.check_cancelled()?;
            if let Some(candidate) = parse_candidate(image, offset) {
                candidates.push(candidate);
            }
        }
        candidates
    };

    debug!("{} header candidates parsed", candidates.len());

    // Largest first: big windows are the most distinctive
    candidates.sort_by(|a, b| {
        b.tables
            .window_size()
            .cmp(&a.tables.window_size())
            .then(a.offset.cmp(&b.offset))
    });

    let _task = progress.begin_task(0.7, "Locating writable tables");
    let mut claimed: Vec<Range<usize>> = candidates.iter().map(Candidate::primary_range).collect();
    let alignment = config.scan_alignment.max(1);
    let mut found = Vec::new();

    for candidate in &candidates {
        progress.check_cancelled()?;

        let Some(window) = find_window(image, &hint, &claimed, alignment, candidate, progress)?
        else {
            warn!(
                "No writable tables found for the header at {:#x} ({}); dropping it",
                candidate.offset, candidate.data_file
            );
            continue;
        };
        claimed.push(window.clone());

        let mut assembled = candidate.primary.clone();
        assembled.extend_from_slice(&image[window.clone()]);
        let stored = &assembled[HASH_OFFSET..HASH_END];
        if header_hash(&assembled).as_bytes().as_slice() == stored {
            debug!("Header at {:#x}: hash confirms window {window:?}", candidate.offset);
        } else {
            debug!(
                "Header at {:#x}: window {window:?} passes checks but the hash differs",
                candidate.offset
            );
        }

        info!(
            "Found {} header at {:#x} with writable tables at {:#x} for {}",
            candidate.tables.version, candidate.offset, window.start, candidate.data_file
        );
        found.push(NefsArchiveSource::Headless {
            header_path: exe_path.to_path_buf(),
            primary_offset: candidate.offset as u64,
            primary_size: candidate.primary.len() as u32,
            secondary_offset: window.start as u64,
            secondary_size: window.len() as u32,
            data_path: data_dir.join(&candidate.data_file),
        });
    }

    found.sort_by_key(|source| match source {
        NefsArchiveSource::Headless { primary_offset, .. } => *primary_offset,
        _ => 0,
    });
    Ok(found)
}

/// Offsets of the magic number in either byte order, ascending
fn magic_offsets(image: &[u8]) -> Vec<usize> {
    let little = NEFS_MAGIC.to_le_bytes();
    let big = NEFS_MAGIC.to_be_bytes();
    let mut offsets: Vec<usize> = memmem::find_iter(image, &little)
        .chain(memmem::find_iter(image, &big))
        .collect();
    offsets.sort_unstable();
    offsets.dedup();
    offsets
}

/// End of the primary table starting at `offset`
fn primary_table_end(info: &TocInfo, offset: u32) -> Option<u32> {
    let toc_end = (INTRO_SIZE + Toc160::SIZE) as u32;
    [
        info.entry_offset,
        info.shared_offset,
        info.name_offset,
        info.block_offset,
        info.volume_offset,
        info.hash_digest_offset.unwrap_or(0),
    ]
    .into_iter()
    .filter(|&other| other >= toc_end && other > offset)
    .min()
}

fn parse_candidate(image: &[u8], offset: usize) -> Option<Candidate> {
    let bytes = image.get(offset..)?;
    let endian = detect_magic(bytes)?;

    let version = NefsVersion::from_tag(read_u32(bytes, VERSION_OFFSET, endian)?).ok()?;
    if !version.supports_headless() {
        debug!("Skipping {version} header at {offset:#x}");
        return None;
    }

    let header_size = read_u32(bytes, HEADER_SIZE_OFFSET, endian)? as usize;
    let entry_count = read_u32(bytes, ENTRY_COUNT_OFFSET, endian)? as usize;

    let mut codec = TocCodec::new(endian);
    let toc: Toc160 = codec
        .read_record(&mut Cursor::new(bytes), INTRO_SIZE as u64)
        .ok()?;
    let info = toc.info();

    let shared_end = primary_table_end(&info, info.shared_offset)?;
    let shared_count = (shared_end.checked_sub(info.shared_offset)? as usize) / SHARED_INFO_SIZE;
    let secondary_size = entry_count * validate::WRITABLE_ENTRY_SIZE
        + shared_count * validate::WRITABLE_SHARED_SIZE;

    let primary_size = header_size.checked_sub(secondary_size)?;
    if primary_size < INTRO_SIZE + Toc160::SIZE {
        return None;
    }
    let primary = bytes.get(..primary_size)?.to_vec();

    // Parse with an all-zero secondary section to get the primary tables
    let mut probe = primary.clone();
    probe.resize(header_size, 0);
    let meta = HeaderMeta {
        endian,
        secondary_base: Some(primary_size as u32),
        ..HeaderMeta::default()
    };
    let header = NefsHeader::parse(&probe, meta).ok()?;

    let entries = header.entries();
    let shared_infos = header.shared_infos();
    if entries.len() != entry_count || shared_infos.len() != shared_count {
        debug!(
            "Header at {offset:#x}: {} entries and {} shared infos, expected {entry_count} and {shared_count}",
            entries.len(),
            shared_infos.len()
        );
        return None;
    }

    let volumes = header.volumes();
    let Some(data_file) = volumes
        .first()
        .and_then(|volume| header.names().get(volume.name_offset))
        .filter(|name| !name.is_empty())
    else {
        warn!("Header at {offset:#x} names no data file; skipping it");
        return None;
    };

    Some(Candidate {
        offset,
        primary,
        tables: CandidateTables {
            version,
            endian,
            entries,
            shared_infos,
            volume_count: info.volume_count.unwrap_or(volumes.len() as u16),
        },
        data_file,
    })
}

/// First aligned, unclaimed window in `hint` that the candidate accepts
fn find_window(
    image: &[u8],
    hint: &Range<usize>,
    claimed: &[Range<usize>],
    alignment: usize,
    candidate: &Candidate,
    progress: &NefsProgress,
) -> NefsResult<Option<Range<usize>>> {
    let size = candidate.tables.window_size();
    if size == 0 {
        return Ok(Some(hint.start..hint.start));
    }

    let align = |value: usize| align_up(value as u64, alignment as u64) as usize;
    let mut position = align(hint.start);
    let mut probes = 0usize;

    while position + size <= hint.end {
        let window = position..position + size;

        if let Some(overlap) = claimed
            .iter()
            .find(|range| range.start < window.end && window.start < range.end)
        {
            position = align(overlap.end.max(position + 1));
            continue;
        }

        if candidate.tables.accepts(&image[window.clone()]) {
            return Ok(Some(window));
        }

        probes += 1;
        if probes % PROBES_PER_CHECK == 0 {
            progress.check_cancelled()?;
        }
        position += alignment;
    }
    Ok(None)
}
