//! LZSS codec used by some NeFS titles
//!
//! The variant uses a 4 KiB window with 18-byte maximum matches. A ring
//! buffer prefilled with spaces starts writing at 4078. Each flag byte
//! governs the next eight tokens, least significant bit first: a set bit is
//! a literal byte, a clear bit a two-byte back-reference holding a 12-bit
//! ring position and a 4-bit length minus three.
//!
//! [`LzssDecompressor`] keeps all state between calls so input and output
//! can arrive in windows of any size.

use crate::{NefsError, NefsResult};

const RING_SIZE: usize = 4096;
const MAX_MATCH: usize = 18;
const THRESHOLD: usize = 2;
const MIN_MATCH: usize = THRESHOLD + 1;
const RING_MASK: usize = RING_SIZE - 1;
const RING_START: usize = RING_SIZE - MAX_MATCH;
const FILL: u8 = 0x20;

/// Ring buffer length, including the look-ahead tail
pub const RING_BUFFER_LEN: usize = RING_SIZE + MAX_MATCH - 1;

/// Stateful windowed LZSS decompressor
#[derive(Clone)]
pub struct LzssDecompressor {
    ring: [u8; RING_BUFFER_LEN],
    cursor: usize,
    flags: u8,
    flag_bits: u8,
    pending: Option<u8>,
    copy_pos: usize,
    copy_left: usize,
}

impl std::fmt::Debug for LzssDecompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LzssDecompressor")
            .field("cursor", &self.cursor)
            .field("flag_bits", &self.flag_bits)
            .field("pending", &self.pending)
            .field("copy_left", &self.copy_left)
            .finish_non_exhaustive()
    }
}

impl Default for LzssDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl LzssDecompressor {
    /// Create a decompressor at the start of a stream
    pub const fn new() -> Self {
        Self {
            ring: [FILL; RING_BUFFER_LEN],
            cursor: RING_START,
            flags: 0,
            flag_bits: 0,
            pending: None,
            copy_pos: 0,
            copy_left: 0,
        }
    }

    /// Whether input stopped inside a back-reference
    pub const fn is_mid_reference(&self) -> bool {
        self.pending.is_some()
    }

    fn emit(&mut self, byte: u8, output: &mut [u8], produced: &mut usize) {
        output[*produced] = byte;
        *produced += 1;
        self.ring[self.cursor] = byte;
        self.cursor = (self.cursor + 1) & RING_MASK;
    }

    fn consume_flag(&mut self) {
        self.flags >>= 1;
        self.flag_bits -= 1;
    }

    /// Decompress as much as fits from `input` into `output`
    ///
    /// Returns `(consumed, produced)`. Stops when the output is full or the
    /// input is exhausted; the next call continues where this one stopped.
    pub fn decompress(&mut self, input: &[u8], output: &mut [u8]) -> (usize, usize) {
        let mut consumed = 0;
        let mut produced = 0;

        loop {
            while self.copy_left > 0 {
                if produced == output.len() {
                    return (consumed, produced);
                }
                let byte = self.ring[self.copy_pos & RING_MASK];
                self.copy_pos += 1;
                self.copy_left -= 1;
                self.emit(byte, output, &mut produced);
            }

            if produced == output.len() {
                return (consumed, produced);
            }

            if self.flag_bits == 0 {
                let Some(&flags) = input.get(consumed) else {
                    return (consumed, produced);
                };
                consumed += 1;
                self.flags = flags;
                self.flag_bits = 8;
            }

            if self.flags & 1 == 1 {
                let Some(&byte) = input.get(consumed) else {
                    return (consumed, produced);
                };
                consumed += 1;
                self.consume_flag();
                self.emit(byte, output, &mut produced);
            } else {
                let low = match self.pending.take() {
                    Some(low) => low,
                    None => {
                        let Some(&low) = input.get(consumed) else {
                            return (consumed, produced);
                        };
                        consumed += 1;
                        low
                    }
                };
                let Some(&high) = input.get(consumed) else {
                    self.pending = Some(low);
                    return (consumed, produced);
                };
                consumed += 1;
                self.consume_flag();

                self.copy_pos = usize::from(low) | (usize::from(high & 0xF0) << 4);
                self.copy_left = usize::from(high & 0x0F) + MIN_MATCH;
            }
        }
    }

    /// Report corruption if the input ended inside a back-reference
    pub fn finish(&self) -> NefsResult<()> {
        if self.is_mid_reference() {
            return Err(NefsError::Decompression(
                "LZSS input ended inside a back-reference".to_string(),
            ));
        }
        Ok(())
    }
}

/// Decompress a complete buffer into at most `expected_len` bytes
///
/// Input left over once `expected_len` bytes are produced is ignored.
pub fn decompress(input: &[u8], expected_len: usize) -> NefsResult<Vec<u8>> {
    let mut decoder = LzssDecompressor::new();
    let mut output = vec![0u8; expected_len];
    let (_, produced) = decoder.decompress(input, &mut output);

    if produced < expected_len {
        decoder.finish()?;
        output.truncate(produced);
    }
    Ok(output)
}

/// Compress a buffer with greedy matching
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut ring = [FILL; RING_SIZE];
    let mut cursor = RING_START;
    let mut output = Vec::with_capacity(input.len() + input.len() / 8 + 1);

    let mut pos = 0;
    let mut flag_index = 0;
    let mut flag_bit = 8;

    while pos < input.len() {
        if flag_bit == 8 {
            flag_index = output.len();
            output.push(0);
            flag_bit = 0;
        }

        let (match_pos, match_len) = longest_match(&ring, cursor, &input[pos..]);
        let len = if match_len >= MIN_MATCH {
            output.push((match_pos & 0xFF) as u8);
            output.push((((match_pos >> 4) & 0xF0) | (match_len - MIN_MATCH)) as u8);
            match_len
        } else {
            output[flag_index] |= 1 << flag_bit;
            output.push(input[pos]);
            1
        };
        flag_bit += 1;

        for &byte in &input[pos..pos + len] {
            ring[cursor] = byte;
            cursor = (cursor + 1) & RING_MASK;
        }
        pos += len;
    }

    output
}

/// Longest match for `ahead` in the ring, as the decoder would replay it
///
/// A match may run into bytes the decoder writes during the same copy.
fn longest_match(ring: &[u8; RING_SIZE], cursor: usize, ahead: &[u8]) -> (usize, usize) {
    let limit = ahead.len().min(MAX_MATCH);
    let mut best = (0, 0);
    if limit < MIN_MATCH {
        return best;
    }

    for start in 0..RING_SIZE {
        let mut len = 0;
        while len < limit {
            let src = (start + len) & RING_MASK;
            let distance = src.wrapping_sub(cursor) & RING_MASK;
            let byte = if distance < len {
                ahead[distance]
            } else {
                ring[src]
            };
            if byte != ahead[len] {
                break;
            }
            len += 1;
        }

        if len > best.1 {
            best = (start, len);
            if len == limit {
                break;
            }
        }
    }

    best
}
