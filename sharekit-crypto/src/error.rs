//! Error type shared by all primitive operations.

use thiserror::Error;

/// Failures surfaced by the primitives adapter.
///
/// Authentication failures are deliberately uniform: an AEAD tag mismatch
/// and a malformed ciphertext both report [`CryptoError::DecryptionFailed`],
/// so callers cannot leak which check rejected the input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD or sealed-box decryption failed authentication.
    #[error("decryption failed")]
    DecryptionFailed,

    /// AEAD or sealed-box encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// A signature did not verify against the given public key.
    #[error("invalid signature")]
    InvalidSignature,

    /// A key or buffer had the wrong length.
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Length the operation required.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },
}
