//! Ed25519 signatures.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, SIGNATURE_KEY_SIZE, SIGNATURE_SIZE};

/// Public half of an Ed25519 signature key pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicSignatureKey([u8; SIGNATURE_KEY_SIZE]);

impl PublicSignatureKey {
    /// Creates a public signature key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SIGNATURE_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a public signature key from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidLength`] if the slice is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; SIGNATURE_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: SIGNATURE_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for PublicSignatureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicSignatureKey({})", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for PublicSignatureKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Private half of an Ed25519 signature key pair (the 32-byte seed).
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct PrivateSignatureKey([u8; SIGNATURE_KEY_SIZE]);

impl PrivateSignatureKey {
    /// Creates a private signature key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SIGNATURE_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw seed bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for PrivateSignatureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateSignatureKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// A detached Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "serde_bytes_64")] [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Creates a signature from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a signature from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidLength`] if the slice is not 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; SIGNATURE_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: SIGNATURE_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Returns the raw signature bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

/// An Ed25519 key pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureKeyPair {
    /// Public half.
    pub public_key: PublicSignatureKey,
    /// Private half.
    pub private_key: PrivateSignatureKey,
}

impl SignatureKeyPair {
    /// Generates a fresh key pair.
    #[must_use]
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        Self {
            public_key: PublicSignatureKey(signing.verifying_key().to_bytes()),
            private_key: PrivateSignatureKey(signing.to_bytes()),
        }
    }

    /// Rebuilds a key pair from a private seed, recomputing the public half.
    #[must_use]
    pub fn from_private_key(private_key: PrivateSignatureKey) -> Self {
        let signing = SigningKey::from_bytes(private_key.as_bytes());
        Self {
            public_key: PublicSignatureKey(signing.verifying_key().to_bytes()),
            private_key,
        }
    }
}

impl std::fmt::Debug for SignatureKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Signs `message` with the private key.
#[must_use]
pub fn sign(message: &[u8], key: &PrivateSignatureKey) -> Signature {
    let signing = SigningKey::from_bytes(key.as_bytes());
    Signature(signing.sign(message).to_bytes())
}

/// Verifies a detached signature over `message`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidSignature`] if the key bytes do not form
/// a valid curve point or the signature does not verify.
pub fn verify(
    message: &[u8],
    signature: &Signature,
    key: &PublicSignatureKey,
) -> Result<(), CryptoError> {
    let verifying = VerifyingKey::from_bytes(key.as_bytes())
        .map_err(|_| CryptoError::InvalidSignature)?;
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    verifying
        .verify(message, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

mod serde_bytes_64 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &[u8; 64],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; 64], D::Error> {
        let bytes = <Vec<u8>>::deserialize(deserializer)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("expected 64 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let pair = SignatureKeyPair::generate();
        let sig = sign(b"record payload", &pair.private_key);
        verify(b"record payload", &sig, &pair.public_key).unwrap();
    }

    #[test]
    fn test_tampered_message_rejected() {
        let pair = SignatureKeyPair::generate();
        let sig = sign(b"record payload", &pair.private_key);
        assert_eq!(
            verify(b"record payloaD", &sig, &pair.public_key),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn test_wrong_key_rejected() {
        let pair = SignatureKeyPair::generate();
        let other = SignatureKeyPair::generate();
        let sig = sign(b"record payload", &pair.private_key);
        assert_eq!(
            verify(b"record payload", &sig, &other.public_key),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn test_from_private_key_recomputes_public_half() {
        let pair = SignatureKeyPair::generate();
        let rebuilt = SignatureKeyPair::from_private_key(pair.private_key.clone());
        assert_eq!(pair.public_key, rebuilt.public_key);
    }
}
