//! Random byte generation.

use rand::rngs::OsRng;
use rand::RngCore;

/// Fills a fresh vector with `len` random bytes from the OS generator.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Returns a fixed-size array of random bytes from the OS generator.
#[must_use]
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}
