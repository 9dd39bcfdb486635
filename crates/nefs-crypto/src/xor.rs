//! XOR diffusion codec for legacy scrambled header intros
//!
//! Older titles scramble the 128-byte intro with a reversible XOR network over
//! its 32 words. Word 0 is masked with word 12 last, so XOR-ing bytes 0..4
//! with bytes 48..52 of a scrambled intro exposes the magic number without
//! running the full network.

use binrw::Endian;

/// Size of the scrambled intro block
pub const INTRO_SIZE: usize = 128;

/// Byte offset of the word that masks the magic number
pub const MAGIC_PARTNER_OFFSET: usize = 48;

const WORDS: usize = INTRO_SIZE / 4;
const ROUNDS: u32 = 15;
const MASK_FIRST: usize = 15;
const MASK_LAST: usize = 30;

/// Recover the magic number candidate of a scrambled intro
pub fn magic_candidate(intro: &[u8]) -> Option<[u8; 4]> {
    if intro.len() < MAGIC_PARTNER_OFFSET + 4 {
        return None;
    }

    let mut out = [0u8; 4];
    for (i, b) in out.iter_mut().enumerate() {
        *b = intro[i] ^ intro[MAGIC_PARTNER_OFFSET + i];
    }
    Some(out)
}

fn load_words(intro: &[u8; INTRO_SIZE], endian: Endian) -> [u32; WORDS] {
    let mut words = [0u32; WORDS];
    for (word, bytes) in words.iter_mut().zip(intro.chunks_exact(4)) {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        *word = match endian {
            Endian::Little => u32::from_le_bytes(raw),
            Endian::Big => u32::from_be_bytes(raw),
        };
    }
    words
}

fn store_words(words: &[u32; WORDS], intro: &mut [u8; INTRO_SIZE], endian: Endian) {
    for (word, bytes) in words.iter().zip(intro.chunks_exact_mut(4)) {
        let raw = match endian {
            Endian::Little => word.to_le_bytes(),
            Endian::Big => word.to_be_bytes(),
        };
        bytes.copy_from_slice(&raw);
    }
}

const fn partner(i: usize, round: u32) -> usize {
    1 + (i + round as usize) % (WORDS - 1)
}

/// Descramble an intro in place
pub fn decode_intro(intro: &mut [u8; INTRO_SIZE], endian: Endian) {
    let mut w = load_words(intro, endian);

    w[0] ^= w[12];

    for round in 0..ROUNDS {
        for i in 1..WORDS {
            w[i] ^= w[partner(i, round)].rotate_left(round + 1);
        }
    }

    for k in MASK_FIRST..=MASK_LAST {
        w[k] ^= w[0].rotate_right(k as u32);
    }

    store_words(&w, intro, endian);
}

/// Scramble an intro in place; exact inverse of [`decode_intro`]
pub fn encode_intro(intro: &mut [u8; INTRO_SIZE], endian: Endian) {
    let mut w = load_words(intro, endian);

    for k in (MASK_FIRST..=MASK_LAST).rev() {
        w[k] ^= w[0].rotate_right(k as u32);
    }

    for round in (0..ROUNDS).rev() {
        for i in (1..WORDS).rev() {
            w[i] ^= w[partner(i, round)].rotate_left(round + 1);
        }
    }

    w[0] ^= w[12];

    store_words(&w, intro, endian);
}
