//! Header classification, decryption and integrity checks
//!
//! A header is stored in one of three forms:
//!
//! - plain: the intro starts with the magic number
//! - XOR encoded: the intro is scrambled; bytes 0..4 XOR bytes 48..52 give
//!   the magic number
//! - RSA + AES: the intro is an RSA block signed with one of the known keys,
//!   and the rest of the header is AES-256-ECB encrypted with the key found in
//!   the decrypted intro
//!
//! Decoding happens in two steps because the header size is only known once
//! the intro is decoded: [`decode_intro`] classifies and decodes the first
//! 128 bytes, then [`DecodedIntro::finish`] decodes the body.

use binrw::Endian;
use nefs_crypto::ecb::{decrypt_ecb_padded, padded_len};
use nefs_crypto::rsa_block::{RSA_BLOCK_SIZE, decrypt_with_known_keys};
use nefs_crypto::{AesKey, RsaKeyStore, Sha256Hash, xor};
use tracing::{debug, info, warn};

use super::intro::{HEADER_SIZE_OFFSET, INTRO_SIZE, detect_magic, read_u32};
use super::tables::header_hash;
use crate::{NefsError, NefsResult};

/// On-disk form of a header
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HeaderEncoding {
    /// Stored as is
    #[default]
    Plain,
    /// Intro scrambled with the XOR network
    XorEncoded,
    /// Intro RSA-signed, body AES-encrypted
    RsaAesEncrypted {
        /// Name of the key that decrypted the intro
        key_name: String,
    },
}

/// A decoded intro, waiting for the header body
#[derive(Debug, Clone)]
pub struct DecodedIntro {
    /// Decoded intro bytes
    pub intro: [u8; INTRO_SIZE],
    /// Archive byte order
    pub endian: Endian,
    /// How the header was stored
    pub encoding: HeaderEncoding,
    aes_key: Option<AesKey>,
}

/// A fully decoded header image
#[derive(Debug, Clone)]
pub struct DecodedHeader {
    /// Decoded header bytes, `header_size` long
    pub image: Vec<u8>,
    /// Archive byte order
    pub endian: Endian,
    /// How the header was stored
    pub encoding: HeaderEncoding,
    /// Hash recomputed over the bytes the stored hash covers
    pub computed_hash: Sha256Hash,
}

/// Classify and decode a 128-byte intro
///
/// Plain and XOR encoded intros are recognized by their magic number. Any
/// other intro is taken to be RSA-signed and every known key is tried.
pub fn decode_intro(raw: &[u8; INTRO_SIZE], keys: &RsaKeyStore) -> NefsResult<DecodedIntro> {
    if let Some(endian) = detect_magic(raw) {
        return Ok(DecodedIntro {
            intro: *raw,
            endian,
            encoding: HeaderEncoding::Plain,
            aes_key: None,
        });
    }

    if let Some(endian) = xor::magic_candidate(raw).and_then(|magic| detect_magic(&magic)) {
        let mut intro = *raw;
        xor::decode_intro(&mut intro, endian);
        debug!("Header intro is XOR encoded");
        return Ok(DecodedIntro {
            intro,
            endian,
            encoding: HeaderEncoding::XorEncoded,
            aes_key: None,
        });
    }

    if keys.is_empty() {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&raw[..4]);
        return Err(NefsError::InvalidMagic(magic));
    }

    let block: &[u8; RSA_BLOCK_SIZE] = raw;
    let decryption = decrypt_with_known_keys(block, keys, |plain| detect_magic(plain).is_some())
        .ok_or(NefsError::RsaKeyNotFound { tried: keys.len() })?;
    let endian = detect_magic(&decryption.plaintext)
        .ok_or_else(|| NefsError::InvalidHeader("decrypted intro lost its magic".to_string()))?;

    let mut key_hex = [0u8; 64];
    key_hex.copy_from_slice(&decryption.plaintext[0x24..0x64]);
    let aes_key = AesKey::from_hex_ascii(&key_hex)?.ok_or_else(|| {
        NefsError::InvalidHeader("encrypted header carries no AES key".to_string())
    })?;

    info!(
        "Header intro decrypted with RSA key '{}'{}",
        decryption.key_name,
        if decryption.swapped { " (swapped)" } else { "" }
    );

    Ok(DecodedIntro {
        intro: decryption.plaintext,
        endian,
        encoding: HeaderEncoding::RsaAesEncrypted {
            key_name: decryption.key_name,
        },
        aes_key: Some(aes_key),
    })
}

impl DecodedIntro {
    /// Header size declared by the intro
    pub fn header_size(&self) -> u32 {
        read_u32(&self.intro, HEADER_SIZE_OFFSET, self.endian).unwrap_or_default()
    }

    /// Bytes to read after the intro
    ///
    /// Encrypted bodies are rounded up to whole AES blocks.
    pub fn body_read_len(&self) -> usize {
        let body = (self.header_size() as usize).saturating_sub(INTRO_SIZE);
        if self.aes_key.is_some() {
            padded_len(body)
        } else {
            body
        }
    }

    /// Decode the body and assemble the full header image
    ///
    /// `raw_body` holds the stored bytes following the intro. It may be
    /// shorter than [`body_read_len`](Self::body_read_len) when the header ends
    /// at the end of the file; missing bytes are taken as zero.
    pub fn finish(self, mut raw_body: Vec<u8>) -> NefsResult<DecodedHeader> {
        let header_size = self.header_size() as usize;
        if header_size < INTRO_SIZE {
            return Err(NefsError::InvalidHeader(format!(
                "header size {header_size} is smaller than the intro"
            )));
        }

        let body_len = header_size - INTRO_SIZE;
        if raw_body.len() < body_len {
            return Err(NefsError::InvalidHeader(format!(
                "header body truncated: {} of {body_len} bytes",
                raw_body.len()
            )));
        }

        let (body, computed_hash) = match &self.aes_key {
            Some(key) => {
                raw_body.resize(padded_len(body_len), 0);
                let hash = Sha256Hash::from_data(&raw_body[..body_len]);
                let mut body = decrypt_ecb_padded(key, &raw_body);
                body.truncate(body_len);
                (body, Some(hash))
            }
            None => {
                raw_body.truncate(body_len);
                (raw_body, None)
            }
        };

        let mut image = Vec::with_capacity(header_size);
        image.extend_from_slice(&self.intro);
        image.extend_from_slice(&body);

        let computed_hash = computed_hash.unwrap_or_else(|| header_hash(&image));

        Ok(DecodedHeader {
            image,
            endian: self.endian,
            encoding: self.encoding,
            computed_hash,
        })
    }
}

/// Compare a stored hash with the recomputed one
///
/// A mismatch is logged and reported, never raised.
pub fn check_hash(stored: &Sha256Hash, computed: &Sha256Hash) -> bool {
    if stored == computed {
        return true;
    }
    warn!(
        "Header hash mismatch: stored {}, computed {}",
        stored.to_hex(),
        computed.to_hex()
    );
    false
}

/// Scramble the intro of a plain header image in place
pub fn xor_encode_image(image: &mut [u8], endian: Endian) -> NefsResult<()> {
    let intro: &mut [u8; INTRO_SIZE] = image
        .get_mut(..INTRO_SIZE)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| NefsError::InvalidHeader("header shorter than its intro".to_string()))?;
    xor::encode_intro(intro, endian);
    Ok(())
}
