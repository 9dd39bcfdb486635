//! Item-level transform pipeline
//!
//! Items are processed one chunk at a time. Cancellation is checked between
//! chunks, never inside one.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::{debug, warn};

use super::{NefsDataChunk, NefsDataTransform, chunk_checksum, detransform_chunk, transform_chunk};
use crate::progress::NefsProgress;
use crate::{NefsError, NefsResult};

/// Result of transforming one item
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransformedItem {
    /// Chunk records; empty for untransformed items
    pub chunks: Vec<NefsDataChunk>,
    /// Bytes written to the output
    pub transformed_size: u64,
    /// Bytes consumed from the input
    pub extracted_size: u64,
}

/// Transform `extracted_size` bytes from `input` into `output`
///
/// Untransformed items are copied verbatim and get no chunk records.
pub fn transform_item<R: Read, W: Write>(
    input: &mut R,
    extracted_size: u64,
    transform: &NefsDataTransform,
    output: &mut W,
    progress: &NefsProgress,
) -> NefsResult<TransformedItem> {
    progress.check_cancelled()?;

    if !transform.is_transformed() {
        let copied = io::copy(&mut input.take(extracted_size), output)?;
        if copied != extracted_size {
            return Err(NefsError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("item source ended after {copied} of {extracted_size} bytes"),
            )));
        }
        return Ok(TransformedItem {
            chunks: Vec::new(),
            transformed_size: copied,
            extracted_size,
        });
    }

    if transform.chunk_size == 0 {
        return Err(NefsError::InvalidHeader(
            "transformed item with a zero chunk size".to_string(),
        ));
    }

    let steps = transform.chunk_transform();
    let key = transform.aes_key.as_ref();
    let chunk_size = u64::from(transform.chunk_size);
    let mut buffer = vec![0u8; transform.chunk_size as usize];
    let mut chunks = Vec::with_capacity(transform.chunk_count(extracted_size) as usize);
    let mut cumulative: u32 = 0;
    let mut remaining = extracted_size;

    while remaining > 0 {
        progress.check_cancelled()?;

        let len = remaining.min(chunk_size) as usize;
        input.read_exact(&mut buffer[..len])?;

        let transformed = transform_chunk(&buffer[..len], steps, key)?;
        let size = u32::try_from(transformed.len()).map_err(|_| {
            NefsError::InvalidHeader("transformed chunk exceeds 4 GiB".to_string())
        })?;
        cumulative = cumulative.checked_add(size).ok_or_else(|| {
            NefsError::InvalidHeader("transformed item exceeds 4 GiB".to_string())
        })?;

        output.write_all(&transformed)?;
        chunks.push(NefsDataChunk {
            size,
            cumulative_size: cumulative,
            checksum: Some(chunk_checksum(&transformed)),
            transform: steps,
        });
        remaining -= len as u64;
    }

    Ok(TransformedItem {
        chunks,
        transformed_size: u64::from(cumulative),
        extracted_size,
    })
}

/// Restore an item's extracted bytes from its stored form at `offset`
///
/// Without chunk records the stored bytes are copied verbatim. Chunks that
/// decode to more than the remaining expected size are clamped. Returns the
/// number of bytes written.
pub fn detransform_item<R: Read + Seek, W: Write>(
    input: &mut R,
    offset: u64,
    extracted_size: u64,
    chunks: &[NefsDataChunk],
    transform: &NefsDataTransform,
    output: &mut W,
    progress: &NefsProgress,
) -> NefsResult<u64> {
    progress.check_cancelled()?;
    input.seek(SeekFrom::Start(offset))?;

    if chunks.is_empty() {
        let copied = io::copy(&mut input.take(extracted_size), output)?;
        if copied < extracted_size {
            warn!(
                "Item data at offset {offset} ended after {copied} of {extracted_size} bytes"
            );
        }
        return Ok(copied);
    }

    let key = transform.aes_key.as_ref();
    let chunk_size = u64::from(transform.chunk_size.max(1));
    let mut remaining = extracted_size;
    let mut written = 0u64;
    let mut buffer = Vec::new();

    for (index, chunk) in chunks.iter().enumerate() {
        progress.check_cancelled()?;
        if remaining == 0 {
            warn!(
                "Item at offset {offset} has {} surplus chunks",
                chunks.len() - index
            );
            break;
        }

        buffer.resize(chunk.size as usize, 0);
        input.read_exact(&mut buffer)?;

        if let Some(expected) = chunk.checksum {
            let actual = chunk_checksum(&buffer);
            if actual != expected {
                debug!(
                    "Chunk {index} checksum mismatch at offset {offset}: stored {expected:04x}, computed {actual:04x}"
                );
            }
        }

        let expected_len = remaining.min(chunk_size) as usize;
        let data = detransform_chunk(&buffer, chunk.transform, key, expected_len)?;
        if data.len() < expected_len && index + 1 < chunks.len() {
            warn!(
                "Chunk {index} at offset {offset} produced {} of {expected_len} bytes",
                data.len()
            );
        }

        output.write_all(&data)?;
        written += data.len() as u64;
        remaining -= data.len() as u64;
    }

    if remaining > 0 {
        warn!("Item at offset {offset} is {remaining} bytes short of its extracted size");
    }

    Ok(written)
}
