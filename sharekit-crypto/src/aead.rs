//! XChaCha20-Poly1305 authenticated encryption.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::{CryptoError, SymmetricKey, XCHACHA_IV_SIZE};

/// Encrypts `plaintext` under `key` with the given 24-byte nonce.
///
/// The returned buffer is `plaintext.len() + MAC_SIZE` bytes: ciphertext
/// with the Poly1305 tag appended.
///
/// # Errors
///
/// Returns [`CryptoError::EncryptionFailed`] if the cipher rejects the
/// input (plaintext longer than the XChaCha20 limit).
pub fn aead_encrypt(
    key: &SymmetricKey,
    iv: &[u8; XCHACHA_IV_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key.as_bytes()).expect("key length is always 32");
    cipher
        .encrypt(
            XNonce::from_slice(iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Decrypts and authenticates `ciphertext` under `key` and `iv`.
///
/// # Errors
///
/// Returns [`CryptoError::DecryptionFailed`] on tag mismatch or truncated
/// input.
pub fn aead_decrypt(
    key: &SymmetricKey,
    iv: &[u8; XCHACHA_IV_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key.as_bytes()).expect("key length is always 32");
    cipher
        .decrypt(
            XNonce::from_slice(iv),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{random_array, MAC_SIZE};

    #[test]
    fn test_roundtrip() {
        let key = SymmetricKey::generate();
        let iv = random_array();
        let sealed = aead_encrypt(&key, &iv, b"payload", b"").unwrap();
        assert_eq!(sealed.len(), 7 + MAC_SIZE);
        assert_eq!(aead_decrypt(&key, &iv, &sealed, b"").unwrap(), b"payload");
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let key = SymmetricKey::generate();
        let iv = random_array();
        let mut sealed = aead_encrypt(&key, &iv, b"payload", b"").unwrap();
        sealed[0] ^= 0x01;
        assert_eq!(
            aead_decrypt(&key, &iv, &sealed, b""),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_aad_mismatch_rejected() {
        let key = SymmetricKey::generate();
        let iv = random_array();
        let sealed = aead_encrypt(&key, &iv, b"payload", b"context").unwrap();
        assert_eq!(
            aead_decrypt(&key, &iv, &sealed, b"other"),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let key = SymmetricKey::generate();
        let iv = random_array();
        let sealed = aead_encrypt(&key, &iv, b"payload", b"").unwrap();
        assert_eq!(
            aead_decrypt(&key, &iv, &sealed[..sealed.len() - 1], b""),
            Err(CryptoError::DecryptionFailed)
        );
    }
}
