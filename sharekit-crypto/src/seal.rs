//! Anonymous sealed boxes, compatible with libsodium's `crypto_box_seal`.
//!
//! A sealed box encrypts to a recipient's X25519 public key with an
//! ephemeral sender key: `ephemeral_pk(32) ‖ box(plaintext)`. Only the
//! recipient can open it, and nothing links the ciphertext to a sender.

use rand::rngs::OsRng;

use crate::{CryptoError, EncryptionKeyPair, PublicEncryptionKey, SEAL_OVERHEAD};

/// Seals `plaintext` to `recipient`.
///
/// The output is `plaintext.len() + SEAL_OVERHEAD` bytes.
///
/// # Errors
///
/// Returns [`CryptoError::EncryptionFailed`] if the underlying cipher
/// rejects the input.
pub fn seal(
    plaintext: &[u8],
    recipient: &PublicEncryptionKey,
) -> Result<Vec<u8>, CryptoError> {
    let public = crypto_box::PublicKey::from(*recipient.as_bytes());
    public
        .seal(&mut OsRng, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Opens a sealed box with the recipient's key pair.
///
/// # Errors
///
/// Returns [`CryptoError::DecryptionFailed`] if the box is shorter than
/// [`SEAL_OVERHEAD`], was sealed to a different key, or fails
/// authentication.
pub fn seal_open(
    sealed: &[u8],
    keypair: &EncryptionKeyPair,
) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(CryptoError::DecryptionFailed);
    }
    let secret = crypto_box::SecretKey::from(*keypair.private_key.as_bytes());
    secret
        .unseal(sealed)
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_roundtrip() {
        let keypair = EncryptionKeyPair::generate();
        let sealed = seal(b"content key", &keypair.public_key).unwrap();
        assert_eq!(sealed.len(), 11 + SEAL_OVERHEAD);
        assert_eq!(seal_open(&sealed, &keypair).unwrap(), b"content key");
    }

    #[test]
    fn test_seal_is_randomized() {
        let keypair = EncryptionKeyPair::generate();
        let a = seal(b"same input", &keypair.public_key).unwrap();
        let b = seal(b"same input", &keypair.public_key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_recipient_rejected() {
        let keypair = EncryptionKeyPair::generate();
        let other = EncryptionKeyPair::generate();
        let sealed = seal(b"content key", &keypair.public_key).unwrap();
        assert_eq!(
            seal_open(&sealed, &other),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_short_input_rejected() {
        let keypair = EncryptionKeyPair::generate();
        assert_eq!(
            seal_open(&[0u8; 47], &keypair),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_double_seal_roundtrip() {
        // Provisional-identity key publishes seal twice: inner box to the
        // app key, outer box to the server key.
        let app = EncryptionKeyPair::generate();
        let server = EncryptionKeyPair::generate();
        let inner = seal(b"content key", &app.public_key).unwrap();
        let outer = seal(&inner, &server.public_key).unwrap();

        let unsealed_outer = seal_open(&outer, &server).unwrap();
        assert_eq!(seal_open(&unsealed_outer, &app).unwrap(), b"content key");
    }
}
