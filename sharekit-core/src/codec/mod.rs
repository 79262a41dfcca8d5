//! Versioned resource codec.
//!
//! Every encrypted artifact starts with a varint format version. Versions
//! 1, 2, 3, and 5 are one-shot ("simple") formats; version 4 is the
//! chunked streaming format. v1 and v2 are decrypt-only legacy.
//!
//! | v | layout                                           | resource id    |
//! |---|--------------------------------------------------|----------------|
//! | 1 | `0x01 ‖ ciphertext ‖ tag(16) ‖ iv(24)`           | bytes -40..-24 |
//! | 2 | `0x02 ‖ iv(24) ‖ ciphertext ‖ tag(16)`           | last 16 bytes  |
//! | 3 | `0x03 ‖ iv(24) ‖ ciphertext ‖ tag(16)`           | last 16 bytes  |
//! | 4 | `0x04 ‖ chunk_size(u32 LE) ‖ id(16) ‖ chunks…`   | bytes 5..21    |
//! | 5 | `0x05 ‖ id(16) ‖ iv(24) ‖ ciphertext ‖ tag(16)`  | bytes 1..17    |

pub mod simple;
pub mod stream;
pub(crate) mod varint;

use sharekit_crypto::{MAC_SIZE, XCHACHA_IV_SIZE};

use crate::types::{ResourceId, RESOURCE_ID_SIZE};
use crate::{Error, Result};

/// Version written by [`simple::encrypt_simple`].
pub const CURRENT_SIMPLE_VERSION: u64 = 3;

/// Version written by [`simple::encrypt_simple_with_id`].
pub const CURRENT_FIXED_RESOURCE_VERSION: u64 = 5;

/// Version written by the streaming encryptor.
pub const CURRENT_STREAM_VERSION: u64 = 4;

/// A recognized encrypted-artifact format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionFormat {
    /// Legacy one-shot format, decrypt-only.
    SimpleV1,
    /// Legacy one-shot format, decrypt-only.
    SimpleV2,
    /// Current one-shot format.
    SimpleV3,
    /// Chunked streaming format.
    StreamV4,
    /// One-shot format with a caller-supplied resource id.
    SimpleV5,
}

impl EncryptionFormat {
    /// Maps a version integer to its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEncryptionFormat`] for unknown versions.
    pub const fn from_version(version: u64) -> Result<Self> {
        match version {
            1 => Ok(Self::SimpleV1),
            2 => Ok(Self::SimpleV2),
            3 => Ok(Self::SimpleV3),
            4 => Ok(Self::StreamV4),
            5 => Ok(Self::SimpleV5),
            _ => Err(Error::InvalidEncryptionFormat { version }),
        }
    }

    /// The format's version integer.
    #[must_use]
    pub const fn version(self) -> u64 {
        match self {
            Self::SimpleV1 => 1,
            Self::SimpleV2 => 2,
            Self::SimpleV3 => 3,
            Self::StreamV4 => 4,
            Self::SimpleV5 => 5,
        }
    }

    /// Whether this is a one-shot format (as opposed to streaming).
    #[must_use]
    pub const fn is_simple(self) -> bool {
        !matches!(self, Self::StreamV4)
    }

    /// Minimum length of a well-formed artifact in this format.
    #[must_use]
    pub const fn overhead(self) -> usize {
        match self {
            Self::SimpleV1 | Self::SimpleV2 | Self::SimpleV3 => {
                1 + XCHACHA_IV_SIZE + MAC_SIZE
            }
            Self::StreamV4 => stream::StreamHeader::SIZE,
            Self::SimpleV5 => 1 + RESOURCE_ID_SIZE + XCHACHA_IV_SIZE + MAC_SIZE,
        }
    }
}

/// Detects the format of an encrypted artifact from its first bytes.
///
/// Four bytes are always enough to cover the varint version prefix of any
/// known format.
///
/// # Errors
///
/// Returns [`Error::InvalidEncryptionFormat`] if the buffer is empty or
/// starts with an unknown version.
pub fn detect_format(bytes: &[u8]) -> Result<EncryptionFormat> {
    let (version, _) = varint::decode_varint(bytes)?;
    EncryptionFormat::from_version(version)
}

/// Extracts the resource id of an encrypted artifact without the content
/// key.
///
/// # Errors
///
/// Returns [`Error::InvalidEncryptionFormat`] for unknown versions and
/// [`Error::DecryptionFailed`] for buffers shorter than the format's
/// overhead.
pub fn extract_resource_id(bytes: &[u8]) -> Result<ResourceId> {
    let format = detect_format(bytes)?;
    if bytes.len() < format.overhead() {
        return Err(Error::decryption("truncated encrypted data"));
    }
    let id = match format {
        // v1 trails its iv after the tag, so the id sits before it.
        EncryptionFormat::SimpleV1 => {
            &bytes[bytes.len() - XCHACHA_IV_SIZE - RESOURCE_ID_SIZE
                ..bytes.len() - XCHACHA_IV_SIZE]
        }
        EncryptionFormat::SimpleV2 | EncryptionFormat::SimpleV3 => {
            &bytes[bytes.len() - RESOURCE_ID_SIZE..]
        }
        EncryptionFormat::SimpleV5 => &bytes[1..1 + RESOURCE_ID_SIZE],
        EncryptionFormat::StreamV4 => &bytes[5..5 + RESOURCE_ID_SIZE],
    };
    ResourceId::from_slice(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0x01, true ; "v1 simple")]
    #[test_case(0x02, true ; "v2 simple")]
    #[test_case(0x03, true ; "v3 simple")]
    #[test_case(0x04, false ; "v4 streaming")]
    #[test_case(0x05, true ; "v5 simple")]
    fn test_detect_format_known(version: u8, simple: bool) {
        let format = detect_format(&[version, 0, 0, 0]).unwrap();
        assert_eq!(format.is_simple(), simple);
        assert_eq!(format.version(), u64::from(version));
    }

    #[test_case(0x00 ; "version zero")]
    #[test_case(0x06 ; "version six")]
    #[test_case(0x34 ; "ascii four")]
    fn test_detect_format_unknown(version: u8) {
        assert!(matches!(
            detect_format(&[version, 0, 0, 0]),
            Err(Error::InvalidEncryptionFormat { .. })
        ));
    }

    #[test]
    fn test_extract_resource_id_rejects_short_buffer() {
        assert!(matches!(
            extract_resource_id(&[0x03; 12]),
            Err(Error::DecryptionFailed { .. })
        ));
    }
}
