//! Cryptographic primitives adapter for the ShareKit core.
//!
//! This crate wraps a libsodium-class primitive set behind a small, pure
//! API: random bytes, BLAKE2b generic hashing, XChaCha20-Poly1305 AEAD,
//! anonymous sealed boxes, Ed25519 signatures, and the deterministic IV
//! derivation used by the chunked streaming format. It holds no state and
//! performs no I/O.
//!
//! All wire-visible sizes are fixed here so the codec layers above can rely
//! on them as compile-time constants.

mod aead;
mod error;
mod hash;
mod kdf;
mod keys;
mod random;
mod seal;
mod sign;

pub use aead::{aead_decrypt, aead_encrypt};
pub use error::CryptoError;
pub use hash::{generic_hash, generic_hash16};
pub use kdf::derive_iv;
pub use keys::{
    EncryptionKeyPair, PrivateEncryptionKey, PublicEncryptionKey, SymmetricKey,
};
pub use random::{random_array, random_bytes};
pub use seal::{seal, seal_open};
pub use sign::{
    sign, verify, PrivateSignatureKey, PublicSignatureKey, Signature, SignatureKeyPair,
};

/// Size of a symmetric content key in bytes.
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce in bytes.
pub const XCHACHA_IV_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag in bytes.
pub const MAC_SIZE: usize = 16;

/// Size of an X25519 public or private encryption key in bytes.
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Size of an Ed25519 public key or private seed in bytes.
pub const SIGNATURE_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Overhead added by a sealed box: ephemeral public key plus tag.
pub const SEAL_OVERHEAD: usize = ENCRYPTION_KEY_SIZE + MAC_SIZE;

/// Size of a content key sealed once under a recipient public key.
pub const SEALED_KEY_SIZE: usize = SYMMETRIC_KEY_SIZE + SEAL_OVERHEAD;
