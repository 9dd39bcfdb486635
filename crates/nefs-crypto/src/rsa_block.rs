//! Raw RSA over the 128-byte header intro
//!
//! Signed headers store `intro^d mod n` in place of the intro. There is no
//! padding scheme: the 128 bytes are one little-endian integer and the
//! public exponent is always 0x10001. Decryption is a plain modular
//! exponentiation, so the only way to know the right key was used is to
//! check the result for a valid magic number.

pub use rsa::BigUint;

use crate::keys::RsaKeyStore;

/// Size of the RSA-signed intro block
pub const RSA_BLOCK_SIZE: usize = 128;

/// Fixed public exponent
pub const RSA_EXPONENT: u32 = 0x10001;

/// Result of a successful trial decryption
#[derive(Debug, Clone)]
pub struct RsaDecryption {
    /// Name of the key that produced a valid intro
    pub key_name: String,
    /// True when the modulus had to be read big-endian
    pub swapped: bool,
    /// Decrypted intro bytes
    pub plaintext: [u8; RSA_BLOCK_SIZE],
}

/// Compute `block^exponent mod modulus` with little-endian integer encoding
///
/// The result is zero-extended to the full block size.
pub fn modpow_block(
    block: &[u8; RSA_BLOCK_SIZE],
    exponent: &BigUint,
    modulus: &BigUint,
) -> [u8; RSA_BLOCK_SIZE] {
    let value = BigUint::from_bytes_le(block);
    let result = value.modpow(exponent, modulus).to_bytes_le();

    let mut out = [0u8; RSA_BLOCK_SIZE];
    let len = result.len().min(RSA_BLOCK_SIZE);
    out[..len].copy_from_slice(&result[..len]);
    out
}

/// Interpret a stored modulus in the requested byte order
pub fn modulus_from_bytes(bytes: &[u8; RSA_BLOCK_SIZE], swapped: bool) -> BigUint {
    if swapped {
        BigUint::from_bytes_be(bytes)
    } else {
        BigUint::from_bytes_le(bytes)
    }
}

/// Try every known key, in both byte orders, until `accept` approves the output
///
/// Keys are tried in store order; for each key the little-endian reading of
/// the modulus comes first.
pub fn decrypt_with_known_keys<F>(
    block: &[u8; RSA_BLOCK_SIZE],
    store: &RsaKeyStore,
    accept: F,
) -> Option<RsaDecryption>
where
    F: Fn(&[u8; RSA_BLOCK_SIZE]) -> bool,
{
    let exponent = BigUint::from(RSA_EXPONENT);

    for key in store.iter() {
        for swapped in [false, true] {
            let modulus = modulus_from_bytes(&key.modulus, swapped);
            if modulus.bits() == 0 {
                continue;
            }

            let plaintext = modpow_block(block, &exponent, &modulus);
            if accept(&plaintext) {
                return Some(RsaDecryption {
                    key_name: key.name.clone(),
                    swapped,
                    plaintext,
                });
            }
        }
    }

    None
}
