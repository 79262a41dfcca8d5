//! Key-publish records: a content key sealed for one recipient.
//!
//! Three kinds exist, all fixed-layout concatenations without delimiters:
//!
//! - to user / to group: `recipient_pub(32) ‖ resource_id(16) ‖ sealed(80)`
//! - to provisional user: `app_sig_pub(32) ‖ server_sig_pub(32) ‖
//!   resource_id(16) ‖ sealed²(128)`
//!
//! The provisional variant seals twice — inner box to the app-side
//! encryption key, outer box to the server-side one — so neither the
//! application nor the server alone can recover the content key before
//! the claim.

pub mod decryptor;

use sharekit_crypto::{
    seal, PublicEncryptionKey, PublicSignatureKey, SymmetricKey, SEALED_KEY_SIZE,
    SEAL_OVERHEAD,
};

use crate::block::{Nature, Record};
use crate::types::{ResourceId, RESOURCE_ID_SIZE};
use crate::{Error, Result};

/// Size of a content key sealed twice (provisional recipients).
pub const DOUBLE_SEALED_KEY_SIZE: usize = SEALED_KEY_SIZE + SEAL_OVERHEAD;

const KEY_SIZE: usize = 32;
const TO_USER_PAYLOAD_SIZE: usize = KEY_SIZE + RESOURCE_ID_SIZE + SEALED_KEY_SIZE;
const TO_PROVISIONAL_PAYLOAD_SIZE: usize =
    2 * KEY_SIZE + RESOURCE_ID_SIZE + DOUBLE_SEALED_KEY_SIZE;

/// A parsed key-publish record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPublishRecord {
    /// Content key sealed under a user's current public user key.
    ToUser {
        /// The recipient's public user encryption key.
        recipient: PublicEncryptionKey,
        /// The resource this key decrypts.
        resource_id: ResourceId,
        /// `seal(content_key, recipient)`.
        sealed_key: Vec<u8>,
    },
    /// Content key sealed under a group's current public encryption key.
    ToGroup {
        /// The group's public encryption key.
        recipient: PublicEncryptionKey,
        /// The resource this key decrypts.
        resource_id: ResourceId,
        /// `seal(content_key, recipient)`.
        sealed_key: Vec<u8>,
    },
    /// Content key double-sealed for a provisional user.
    ToProvisional {
        /// App-side public signature key of the provisional identity.
        app_signature_public_key: PublicSignatureKey,
        /// Server-side public signature key of the provisional identity.
        server_signature_public_key: PublicSignatureKey,
        /// The resource this key decrypts.
        resource_id: ResourceId,
        /// `seal(seal(content_key, app_enc), server_enc)`.
        sealed_key: Vec<u8>,
    },
}

impl KeyPublishRecord {
    /// The nature tag this record serializes under.
    #[must_use]
    pub const fn nature(&self) -> Nature {
        match self {
            Self::ToUser { .. } => Nature::KeyPublishToUser,
            Self::ToGroup { .. } => Nature::KeyPublishToUserGroup,
            Self::ToProvisional { .. } => Nature::KeyPublishToProvisionalUser,
        }
    }

    /// The resource this record publishes a key for.
    #[must_use]
    pub const fn resource_id(&self) -> ResourceId {
        match self {
            Self::ToUser { resource_id, .. }
            | Self::ToGroup { resource_id, .. }
            | Self::ToProvisional { resource_id, .. } => *resource_id,
        }
    }

    /// Serializes the record into a postable [`Record`].
    #[must_use]
    pub fn serialize(&self) -> Record {
        let payload = match self {
            Self::ToUser {
                recipient,
                resource_id,
                sealed_key,
            }
            | Self::ToGroup {
                recipient,
                resource_id,
                sealed_key,
            } => {
                let mut out = Vec::with_capacity(TO_USER_PAYLOAD_SIZE);
                out.extend_from_slice(recipient.as_bytes());
                out.extend_from_slice(resource_id.as_bytes());
                out.extend_from_slice(sealed_key);
                out
            }
            Self::ToProvisional {
                app_signature_public_key,
                server_signature_public_key,
                resource_id,
                sealed_key,
            } => {
                let mut out = Vec::with_capacity(TO_PROVISIONAL_PAYLOAD_SIZE);
                out.extend_from_slice(app_signature_public_key.as_bytes());
                out.extend_from_slice(server_signature_public_key.as_bytes());
                out.extend_from_slice(resource_id.as_bytes());
                out.extend_from_slice(sealed_key);
                out
            }
        };
        Record {
            nature: self.nature(),
            payload,
        }
    }

    /// Parses a record payload for the given nature tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] for a nature that is not a key publish
    /// or a payload whose length does not match its fixed layout.
    pub fn deserialize(nature: u8, payload: &[u8]) -> Result<Self> {
        match Nature::from_wire(nature) {
            Ok(Nature::KeyPublishToUser) => {
                let (recipient, resource_id, sealed_key) = split_simple(payload)?;
                Ok(Self::ToUser {
                    recipient,
                    resource_id,
                    sealed_key,
                })
            }
            Ok(Nature::KeyPublishToUserGroup) => {
                let (recipient, resource_id, sealed_key) = split_simple(payload)?;
                Ok(Self::ToGroup {
                    recipient,
                    resource_id,
                    sealed_key,
                })
            }
            Ok(Nature::KeyPublishToProvisionalUser) => {
                if payload.len() != TO_PROVISIONAL_PAYLOAD_SIZE {
                    return Err(Error::internal(
                        "malformed key publish to provisional user",
                    ));
                }
                Ok(Self::ToProvisional {
                    app_signature_public_key: PublicSignatureKey::from_slice(
                        &payload[..KEY_SIZE],
                    )
                    .map_err(|err| Error::internal(err.to_string()))?,
                    server_signature_public_key: PublicSignatureKey::from_slice(
                        &payload[KEY_SIZE..2 * KEY_SIZE],
                    )
                    .map_err(|err| Error::internal(err.to_string()))?,
                    resource_id: ResourceId::from_slice(
                        &payload[2 * KEY_SIZE..2 * KEY_SIZE + RESOURCE_ID_SIZE],
                    )?,
                    sealed_key: payload[2 * KEY_SIZE + RESOURCE_ID_SIZE..].to_vec(),
                })
            }
            _ => Err(Error::internal("invalid nature for key publish")),
        }
    }
}

fn split_simple(payload: &[u8]) -> Result<(PublicEncryptionKey, ResourceId, Vec<u8>)> {
    if payload.len() != TO_USER_PAYLOAD_SIZE {
        return Err(Error::internal("malformed key publish"));
    }
    let recipient = PublicEncryptionKey::from_slice(&payload[..KEY_SIZE])
        .map_err(|err| Error::internal(err.to_string()))?;
    let resource_id =
        ResourceId::from_slice(&payload[KEY_SIZE..KEY_SIZE + RESOURCE_ID_SIZE])?;
    let sealed_key = payload[KEY_SIZE + RESOURCE_ID_SIZE..].to_vec();
    Ok((recipient, resource_id, sealed_key))
}

/// Seals a content key for a user recipient.
///
/// # Errors
///
/// Returns [`Error::Internal`] if sealing fails.
pub fn make_user_key_publish(
    recipient: PublicEncryptionKey,
    content_key: &SymmetricKey,
    resource_id: ResourceId,
) -> Result<KeyPublishRecord> {
    Ok(KeyPublishRecord::ToUser {
        recipient,
        resource_id,
        sealed_key: seal(content_key.as_bytes(), &recipient)
            .map_err(|err| Error::internal(format!("sealing content key failed: {err}")))?,
    })
}

/// Seals a content key for a group recipient.
///
/// # Errors
///
/// Returns [`Error::Internal`] if sealing fails.
pub fn make_group_key_publish(
    recipient: PublicEncryptionKey,
    content_key: &SymmetricKey,
    resource_id: ResourceId,
) -> Result<KeyPublishRecord> {
    Ok(KeyPublishRecord::ToGroup {
        recipient,
        resource_id,
        sealed_key: seal(content_key.as_bytes(), &recipient)
            .map_err(|err| Error::internal(format!("sealing content key failed: {err}")))?,
    })
}

/// Double-seals a content key for a provisional recipient.
///
/// # Errors
///
/// Returns [`Error::Internal`] if sealing fails.
pub fn make_provisional_key_publish(
    app_signature_public_key: PublicSignatureKey,
    server_signature_public_key: PublicSignatureKey,
    app_encryption_public_key: &PublicEncryptionKey,
    server_encryption_public_key: &PublicEncryptionKey,
    content_key: &SymmetricKey,
    resource_id: ResourceId,
) -> Result<KeyPublishRecord> {
    let inner = seal(content_key.as_bytes(), app_encryption_public_key)
        .map_err(|err| Error::internal(format!("sealing content key failed: {err}")))?;
    let sealed_key = seal(&inner, server_encryption_public_key)
        .map_err(|err| Error::internal(format!("sealing content key failed: {err}")))?;
    Ok(KeyPublishRecord::ToProvisional {
        app_signature_public_key,
        server_signature_public_key,
        resource_id,
        sealed_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharekit_crypto::{seal_open, EncryptionKeyPair, SignatureKeyPair};

    #[test]
    fn test_to_user_roundtrip() {
        let recipient = EncryptionKeyPair::generate();
        let content_key = SymmetricKey::generate();
        let resource_id = ResourceId::from_bytes([9; 16]);

        let record =
            make_user_key_publish(recipient.public_key, &content_key, resource_id).unwrap();
        let serialized = record.serialize();
        assert_eq!(serialized.nature, Nature::KeyPublishToUser);
        assert_eq!(serialized.payload.len(), TO_USER_PAYLOAD_SIZE);

        let parsed =
            KeyPublishRecord::deserialize(serialized.nature.wire(), &serialized.payload)
                .unwrap();
        assert_eq!(parsed, record);

        let KeyPublishRecord::ToUser { sealed_key, .. } = parsed else {
            panic!("expected a user key publish");
        };
        assert_eq!(
            seal_open(&sealed_key, &recipient).unwrap(),
            content_key.as_bytes()
        );
    }

    #[test]
    fn test_to_group_roundtrip() {
        let group_keys = EncryptionKeyPair::generate();
        let content_key = SymmetricKey::generate();
        let resource_id = ResourceId::from_bytes([7; 16]);

        let record =
            make_group_key_publish(group_keys.public_key, &content_key, resource_id).unwrap();
        let serialized = record.serialize();
        assert_eq!(serialized.nature, Nature::KeyPublishToUserGroup);

        let parsed =
            KeyPublishRecord::deserialize(serialized.nature.wire(), &serialized.payload)
                .unwrap();
        assert_eq!(parsed.resource_id(), resource_id);
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_to_provisional_roundtrip_and_unseal_order() {
        let app_sig = SignatureKeyPair::generate();
        let server_sig = SignatureKeyPair::generate();
        let app_enc = EncryptionKeyPair::generate();
        let server_enc = EncryptionKeyPair::generate();
        let content_key = SymmetricKey::generate();
        let resource_id = ResourceId::from_bytes([3; 16]);

        let record = make_provisional_key_publish(
            app_sig.public_key,
            server_sig.public_key,
            &app_enc.public_key,
            &server_enc.public_key,
            &content_key,
            resource_id,
        )
        .unwrap();
        let serialized = record.serialize();
        assert_eq!(serialized.payload.len(), TO_PROVISIONAL_PAYLOAD_SIZE);

        let parsed =
            KeyPublishRecord::deserialize(serialized.nature.wire(), &serialized.payload)
                .unwrap();
        let KeyPublishRecord::ToProvisional { sealed_key, .. } = parsed else {
            panic!("expected a provisional key publish");
        };
        let inner = seal_open(&sealed_key, &server_enc).unwrap();
        assert_eq!(seal_open(&inner, &app_enc).unwrap(), content_key.as_bytes());
    }

    #[test]
    fn test_unknown_nature_rejected() {
        assert!(matches!(
            KeyPublishRecord::deserialize(10, &[0u8; TO_USER_PAYLOAD_SIZE]),
            Err(Error::Internal { .. })
        ));
        assert!(matches!(
            KeyPublishRecord::deserialize(99, &[0u8; TO_USER_PAYLOAD_SIZE]),
            Err(Error::Internal { .. })
        ));
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(matches!(
            KeyPublishRecord::deserialize(8, &[0u8; TO_USER_PAYLOAD_SIZE - 1]),
            Err(Error::Internal { .. })
        ));
    }
}
