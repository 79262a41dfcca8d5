//! BLAKE2b generic hashing.

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;

/// Hashes `data` with BLAKE2b producing `out_len` bytes (1..=64).
///
/// # Panics
///
/// Panics if `out_len` is zero or greater than 64. Output lengths are
/// compile-time constants at every call site in this workspace.
#[must_use]
pub fn generic_hash(data: &[u8], out_len: usize) -> Vec<u8> {
    let mut hasher = Blake2bVar::new(out_len).expect("output length in 1..=64");
    hasher.update(data);
    let mut out = vec![0u8; out_len];
    hasher
        .finalize_variable(&mut out)
        .expect("buffer length matches output length");
    out
}

/// Hashes `data` with BLAKE2b to a 16-byte digest, the resource-id width.
#[must_use]
pub fn generic_hash16(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&generic_hash(data, 16));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_hash_is_deterministic() {
        assert_eq!(generic_hash(b"data", 32), generic_hash(b"data", 32));
        assert_ne!(generic_hash(b"data", 32), generic_hash(b"tada", 32));
    }

    #[test]
    fn test_output_length_changes_digest() {
        let short = generic_hash(b"data", 16);
        let long = generic_hash(b"data", 32);
        // BLAKE2b parameterizes on output length, so the short digest is
        // not a prefix of the long one.
        assert_ne!(short[..], long[..16]);
    }

    #[test]
    fn test_generic_hash16_width() {
        assert_eq!(generic_hash16(b"key material").len(), 16);
    }
}
