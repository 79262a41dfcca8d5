//! Key newtypes for symmetric and asymmetric encryption.
//!
//! Private material is zeroized on drop and never appears in Debug output.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, ENCRYPTION_KEY_SIZE, SYMMETRIC_KEY_SIZE};

/// A 256-bit symmetric key, as used for per-resource content keys.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_SIZE]);

impl SymmetricKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SYMMETRIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a key from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidLength`] if the slice is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; SYMMETRIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: SYMMETRIC_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Generates a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        Self(crate::random_array())
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Public half of an X25519 encryption key pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicEncryptionKey([u8; ENCRYPTION_KEY_SIZE]);

impl PublicEncryptionKey {
    /// Creates a public key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ENCRYPTION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a public key from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidLength`] if the slice is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; ENCRYPTION_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: ENCRYPTION_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ENCRYPTION_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for PublicEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicEncryptionKey({})", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for PublicEncryptionKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Private half of an X25519 encryption key pair.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct PrivateEncryptionKey([u8; ENCRYPTION_KEY_SIZE]);

impl PrivateEncryptionKey {
    /// Creates a private key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ENCRYPTION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a private key from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidLength`] if the slice is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; ENCRYPTION_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: ENCRYPTION_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ENCRYPTION_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for PrivateEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateEncryptionKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// An X25519 encryption key pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKeyPair {
    /// Public half, shared with other parties.
    pub public_key: PublicEncryptionKey,
    /// Private half, device- or user-local.
    pub private_key: PrivateEncryptionKey,
}

impl EncryptionKeyPair {
    /// Generates a fresh key pair.
    #[must_use]
    pub fn generate() -> Self {
        let secret = crypto_box::SecretKey::generate(&mut OsRng);
        let public = secret.public_key();
        Self {
            public_key: PublicEncryptionKey(*public.as_bytes()),
            private_key: PrivateEncryptionKey(secret.to_bytes()),
        }
    }

    /// Rebuilds a key pair from its two halves.
    #[must_use]
    pub const fn new(
        public_key: PublicEncryptionKey,
        private_key: PrivateEncryptionKey,
    ) -> Self {
        Self {
            public_key,
            private_key,
        }
    }

    /// Rebuilds a key pair from a private key alone, recomputing the
    /// public half.
    #[must_use]
    pub fn from_private_key(private_key: PrivateEncryptionKey) -> Self {
        let secret = crypto_box::SecretKey::from(*private_key.as_bytes());
        let public = secret.public_key();
        Self {
            public_key: PublicEncryptionKey(*public.as_bytes()),
            private_key,
        }
    }
}

impl std::fmt::Debug for EncryptionKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_pairs_are_distinct() {
        let a = EncryptionKeyPair::generate();
        let b = EncryptionKeyPair::generate();
        assert_ne!(a.public_key, b.public_key);
    }

    #[test]
    fn test_from_private_key_recomputes_public_half() {
        let pair = EncryptionKeyPair::generate();
        let rebuilt = EncryptionKeyPair::from_private_key(pair.private_key.clone());
        assert_eq!(pair.public_key, rebuilt.public_key);
    }

    #[test]
    fn test_debug_redacts_private_material() {
        let key = SymmetricKey::generate();
        let formatted = format!("{key:?}");
        assert!(formatted.contains("REDACTED"));
        assert!(!formatted.contains(&hex::encode(key.as_bytes())));
    }

    #[test]
    fn test_from_slice_rejects_bad_length() {
        assert_eq!(
            SymmetricKey::from_slice(&[0u8; 31]),
            Err(CryptoError::InvalidLength {
                expected: 32,
                actual: 31
            })
        );
    }
}
