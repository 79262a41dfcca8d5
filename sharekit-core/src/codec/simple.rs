//! One-shot encryption formats (v1, v2, v3, v5).
//!
//! v3 is the default for new artifacts; v5 carries a caller-supplied
//! resource id so that many artifacts can share one key (encryption
//! sessions). v1 and v2 are parsed for decryption only. v1 trails its iv
//! after the ciphertext (`version ‖ ciphertext ‖ tag ‖ iv`); v2 moved the
//! iv up front and v3 kept that layout.

use sharekit_crypto::{
    aead_decrypt, aead_encrypt, random_array, SymmetricKey, MAC_SIZE, XCHACHA_IV_SIZE,
};

use super::varint::{decode_varint, encode_varint};
use super::EncryptionFormat;
use crate::types::{ResourceId, RESOURCE_ID_SIZE};
use crate::{Error, Result};

/// Encrypts `clear` in the current default one-shot format (v3).
///
/// The resulting artifact's resource id is its trailing authentication
/// tag.
///
/// # Errors
///
/// Returns [`Error::Internal`] if the cipher rejects the input.
pub fn encrypt_simple(key: &SymmetricKey, clear: &[u8]) -> Result<Vec<u8>> {
    let iv = random_array::<XCHACHA_IV_SIZE>();
    let ciphertext = aead_encrypt(key, &iv, clear, b"")
        .map_err(|err| Error::internal(format!("one-shot encryption failed: {err}")))?;

    let mut out = Vec::with_capacity(1 + XCHACHA_IV_SIZE + ciphertext.len());
    encode_varint(super::CURRENT_SIMPLE_VERSION, &mut out);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Encrypts `clear` in the fixed-resource-id format (v5).
///
/// The resource id is written in clear after the version byte and bound
/// into the ciphertext as associated data, so moving the payload under
/// another id fails authentication.
///
/// # Errors
///
/// Returns [`Error::Internal`] if the cipher rejects the input.
pub fn encrypt_simple_with_id(
    key: &SymmetricKey,
    resource_id: ResourceId,
    clear: &[u8],
) -> Result<Vec<u8>> {
    let iv = random_array::<XCHACHA_IV_SIZE>();
    let ciphertext = aead_encrypt(key, &iv, clear, resource_id.as_bytes())
        .map_err(|err| Error::internal(format!("one-shot encryption failed: {err}")))?;

    let mut out =
        Vec::with_capacity(1 + RESOURCE_ID_SIZE + XCHACHA_IV_SIZE + ciphertext.len());
    encode_varint(super::CURRENT_FIXED_RESOURCE_VERSION, &mut out);
    out.extend_from_slice(resource_id.as_bytes());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a one-shot artifact of any supported version.
///
/// # Errors
///
/// Returns [`Error::InvalidEncryptionFormat`] for unknown versions,
/// [`Error::InvalidArgument`] when handed a streaming artifact, and
/// [`Error::DecryptionFailed`] for truncated buffers or authentication
/// failures.
pub fn decrypt_simple(key: &SymmetricKey, encrypted: &[u8]) -> Result<Vec<u8>> {
    let (version, version_len) = decode_varint(encrypted)?;
    let format = EncryptionFormat::from_version(version)?;
    if encrypted.len() < format.overhead() {
        return Err(Error::decryption("truncated encrypted data"));
    }
    let body = &encrypted[version_len..];

    match format {
        EncryptionFormat::SimpleV1 => {
            let (ciphertext, iv) = body.split_at(body.len() - XCHACHA_IV_SIZE);
            let resource_id =
                ResourceId::from_slice(&ciphertext[ciphertext.len() - MAC_SIZE..])?;
            aead_decrypt(key, iv.try_into().expect("split at iv size"), ciphertext, b"")
                .map_err(|_| {
                    Error::decryption_for(resource_id, "authentication failed")
                })
        }
        EncryptionFormat::SimpleV2 | EncryptionFormat::SimpleV3 => {
            let resource_id =
                ResourceId::from_slice(&encrypted[encrypted.len() - MAC_SIZE..])?;
            let (iv, ciphertext) = body.split_at(XCHACHA_IV_SIZE);
            aead_decrypt(key, iv.try_into().expect("split at iv size"), ciphertext, b"")
                .map_err(|_| {
                    Error::decryption_for(resource_id, "authentication failed")
                })
        }
        EncryptionFormat::SimpleV5 => {
            let (id_bytes, rest) = body.split_at(RESOURCE_ID_SIZE);
            let resource_id = ResourceId::from_slice(id_bytes)?;
            let (iv, ciphertext) = rest.split_at(XCHACHA_IV_SIZE);
            aead_decrypt(
                key,
                iv.try_into().expect("split at iv size"),
                ciphertext,
                resource_id.as_bytes(),
            )
            .map_err(|_| Error::decryption_for(resource_id, "authentication failed"))
        }
        EncryptionFormat::StreamV4 => Err(Error::invalid_argument(
            "streaming artifact passed to the one-shot decryptor",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::extract_resource_id;

    fn key() -> SymmetricKey {
        SymmetricKey::from_bytes([0u8; 32])
    }

    #[test]
    fn test_v3_roundtrip_and_layout() {
        let clear = b"this is very secret";
        let encrypted = encrypt_simple(&key(), clear).unwrap();

        assert_eq!(encrypted[0], 0x03);
        assert_eq!(encrypted.len(), 1 + XCHACHA_IV_SIZE + clear.len() + MAC_SIZE);
        assert_eq!(decrypt_simple(&key(), &encrypted).unwrap(), clear);
    }

    #[test]
    fn test_v3_resource_id_is_trailing_mac() {
        let encrypted = encrypt_simple(&key(), b"payload").unwrap();
        let id = extract_resource_id(&encrypted).unwrap();
        assert_eq!(id.as_bytes()[..], encrypted[encrypted.len() - 16..]);
    }

    #[test]
    fn test_v3_fresh_iv_each_call() {
        let a = encrypt_simple(&key(), b"payload").unwrap();
        let b = encrypt_simple(&key(), b"payload").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_v5_roundtrip_and_layout() {
        let id = ResourceId::from_bytes([0x42; 16]);
        let clear = b"session data";
        let encrypted = encrypt_simple_with_id(&key(), id, clear).unwrap();

        assert_eq!(encrypted[0], 0x05);
        assert_eq!(
            encrypted.len(),
            1 + RESOURCE_ID_SIZE + XCHACHA_IV_SIZE + clear.len() + MAC_SIZE
        );
        assert_eq!(extract_resource_id(&encrypted).unwrap(), id);
        assert_eq!(decrypt_simple(&key(), &encrypted).unwrap(), clear);
    }

    #[test]
    fn test_v5_id_is_authenticated() {
        let id = ResourceId::from_bytes([0x42; 16]);
        let mut encrypted =
            encrypt_simple_with_id(&key(), id, b"session data").unwrap();
        encrypted[1] ^= 0x01;
        assert!(matches!(
            decrypt_simple(&key(), &encrypted),
            Err(Error::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_legacy_v1_vector() {
        use base64::prelude::{Engine as _, BASE64_STANDARD};
        let content_key = SymmetricKey::from_slice(
            &BASE64_STANDARD
                .decode("dg2OgFy8qLba6s9mRsrX6086vGmsm853NY6oMdcvFN0=")
                .unwrap(),
        )
        .unwrap();
        let encrypted = BASE64_STANDARD
            .decode("Acld5go0solCem3a13ukWKe/yE/1Up4SBJ38qoOwcVmR+6ribUsBB9zO2czErd+Je4YOFCJWPEMWl5po")
            .unwrap();
        assert_eq!(
            decrypt_simple(&content_key, &encrypted).unwrap(),
            b"this is very secret"
        );
    }

    #[test]
    fn test_legacy_v2_vector() {
        use base64::prelude::{Engine as _, BASE64_STANDARD};
        let content_key = SymmetricKey::from_slice(
            &BASE64_STANDARD
                .decode("XqV1NmaWWhDumAmjIg7SLckNO+UJczlclFFNGjgkZx0=")
                .unwrap(),
        )
        .unwrap();
        let encrypted = BASE64_STANDARD
            .decode("Ag40o25KiX7q4WjhCitEmYOBwGhZMTuPw+1j/Kuy+Nez89AWogT17gKzaViCZ13r7YhA9077CX1mwuxy")
            .unwrap();
        assert_eq!(
            decrypt_simple(&content_key, &encrypted).unwrap(),
            b"this is very secret"
        );
    }

    #[test]
    fn test_truncated_buffer_rejected() {
        let encrypted = encrypt_simple(&key(), b"payload").unwrap();
        assert!(matches!(
            decrypt_simple(&key(), &encrypted[..encrypted.len() - 1]),
            Err(Error::DecryptionFailed { .. })
        ));
        assert!(matches!(
            decrypt_simple(&key(), &encrypted[..12]),
            Err(Error::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_flipped_byte_rejected() {
        let mut encrypted = encrypt_simple(&key(), b"payload").unwrap();
        let middle = encrypted.len() / 2;
        encrypted[middle] ^= 0x40;
        assert!(matches!(
            decrypt_simple(&key(), &encrypted),
            Err(Error::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn test_unknown_version_rejected() {
        assert!(matches!(
            decrypt_simple(&key(), &[0x06; 60]),
            Err(Error::InvalidEncryptionFormat { version: 6 })
        ));
    }
}
