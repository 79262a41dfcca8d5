//! Group record payloads and their byte codecs.

use sharekit_crypto::{
    seal, sign, verify, EncryptionKeyPair, PublicEncryptionKey, PublicSignatureKey,
    Signature, SignatureKeyPair, SEALED_KEY_SIZE, SEAL_OVERHEAD, SIGNATURE_SIZE,
};

use crate::block::Nature;
use crate::client::PublicUser;
use crate::codec::varint::{decode_varint, encode_varint};
use crate::provisional::PublicProvisionalUser;
use crate::types::{GroupId, UserId};
use crate::{Error, Result};

/// Sealed group private signature key: 32-byte seed plus seal overhead.
const SEALED_SIGNATURE_KEY_SIZE: usize = 32 + SEAL_OVERHEAD;

/// Sealed group private encryption key, double-sealed for provisionals.
const DOUBLE_SEALED_KEY_SIZE: usize = SEALED_KEY_SIZE + SEAL_OVERHEAD;

const MEMBER_ENTRY_SIZE: usize = 32 + 32 + SEALED_KEY_SIZE;
const PROVISIONAL_ENTRY_SIZE: usize = 4 * 32 + DOUBLE_SEALED_KEY_SIZE;

/// A permanent member entry: the group private key sealed under the
/// member's user key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    /// The member.
    pub user_id: UserId,
    /// The member's public user encryption key at sealing time.
    pub public_user_encryption_key: PublicEncryptionKey,
    /// `seal(group_enc_priv, public_user_encryption_key)`.
    pub sealed_group_private_key: Vec<u8>,
}

/// The four public keys of a provisional identity, as needed to seal a
/// group key for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionalMemberKeys {
    /// App-side public signature key.
    pub app_signature_public_key: PublicSignatureKey,
    /// Server-side public signature key.
    pub server_signature_public_key: PublicSignatureKey,
    /// App-side public encryption key.
    pub app_encryption_public_key: PublicEncryptionKey,
    /// Server-side public encryption key.
    pub server_encryption_public_key: PublicEncryptionKey,
}

impl From<&PublicProvisionalUser> for ProvisionalMemberKeys {
    fn from(user: &PublicProvisionalUser) -> Self {
        Self {
            app_signature_public_key: user.app_signature_public_key,
            server_signature_public_key: user.server_signature_public_key,
            app_encryption_public_key: user.app_encryption_public_key,
            server_encryption_public_key: user.server_encryption_public_key,
        }
    }
}

impl From<&GroupProvisionalMember> for ProvisionalMemberKeys {
    fn from(member: &GroupProvisionalMember) -> Self {
        Self {
            app_signature_public_key: member.app_signature_public_key,
            server_signature_public_key: member.server_signature_public_key,
            app_encryption_public_key: member.app_encryption_public_key,
            server_encryption_public_key: member.server_encryption_public_key,
        }
    }
}

/// A provisional member entry: the group private key double-sealed under
/// the provisional identity's two encryption keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupProvisionalMember {
    /// App-side public signature key of the provisional identity.
    pub app_signature_public_key: PublicSignatureKey,
    /// Server-side public signature key of the provisional identity.
    pub server_signature_public_key: PublicSignatureKey,
    /// App-side public encryption key, kept for later re-sealing.
    pub app_encryption_public_key: PublicEncryptionKey,
    /// Server-side public encryption key, kept for later re-sealing.
    pub server_encryption_public_key: PublicEncryptionKey,
    /// `seal(seal(group_enc_priv, app_enc), server_enc)`.
    pub sealed_group_private_key: Vec<u8>,
}

/// The record establishing a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupCreation {
    /// The group's public signature key; doubles as the group id.
    pub public_signature_key: PublicSignatureKey,
    /// The group's initial public encryption key.
    pub public_encryption_key: PublicEncryptionKey,
    /// `seal(group_sig_priv, public_encryption_key)`.
    pub sealed_private_signature_key: Vec<u8>,
    /// Initial permanent members.
    pub members: Vec<GroupMember>,
    /// Initial provisional members.
    pub provisional_members: Vec<GroupProvisionalMember>,
    /// Signature over the preceding payload bytes by the group key.
    pub self_signature: Signature,
}

/// A record rotating a group's encryption key and membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupAddition {
    /// The group being updated.
    pub group_id: GroupId,
    /// The rotated public encryption key.
    pub public_encryption_key: PublicEncryptionKey,
    /// `seal(group_sig_priv, public_encryption_key)` under the new key.
    pub sealed_private_signature_key: Vec<u8>,
    /// The complete permanent membership after this addition.
    pub members: Vec<GroupMember>,
    /// The complete provisional membership after this addition.
    pub provisional_members: Vec<GroupProvisionalMember>,
    /// Signature over the preceding payload bytes by the group key.
    pub self_signature: Signature,
}

/// Any record in a group's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserGroupRecord {
    /// Establishes the group.
    Creation(UserGroupCreation),
    /// Rotates keys and membership.
    Addition(UserGroupAddition),
}

impl UserGroupRecord {
    /// The group this record belongs to.
    #[must_use]
    pub const fn group_id(&self) -> GroupId {
        match self {
            Self::Creation(creation) => {
                GroupId::from_bytes(*creation.public_signature_key.as_bytes())
            }
            Self::Addition(addition) => addition.group_id,
        }
    }

    /// Parses a group record payload for the given nature tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] for non-group natures or malformed
    /// payloads.
    pub fn deserialize(nature: u8, payload: &[u8]) -> Result<Self> {
        match Nature::from_wire(nature) {
            Ok(Nature::UserGroupCreation) => {
                Ok(Self::Creation(UserGroupCreation::deserialize(payload)?))
            }
            Ok(Nature::UserGroupAddition) => {
                Ok(Self::Addition(UserGroupAddition::deserialize(payload)?))
            }
            _ => Err(Error::internal("invalid nature for group record")),
        }
    }
}

fn seal_members(
    encryption_key_pair: &EncryptionKeyPair,
    users: &[PublicUser],
) -> Result<Vec<GroupMember>> {
    users
        .iter()
        .map(|user| {
            Ok(GroupMember {
                user_id: user.user_id,
                public_user_encryption_key: user.public_encryption_key,
                sealed_group_private_key: seal(
                    encryption_key_pair.private_key.as_bytes(),
                    &user.public_encryption_key,
                )
                .map_err(|err| {
                    Error::internal(format!("sealing group key failed: {err}"))
                })?,
            })
        })
        .collect()
}

fn seal_provisional_members(
    encryption_key_pair: &EncryptionKeyPair,
    users: &[ProvisionalMemberKeys],
) -> Result<Vec<GroupProvisionalMember>> {
    users
        .iter()
        .map(|user| {
            let inner = seal(
                encryption_key_pair.private_key.as_bytes(),
                &user.app_encryption_public_key,
            )
            .map_err(|err| Error::internal(format!("sealing group key failed: {err}")))?;
            let sealed = seal(&inner, &user.server_encryption_public_key)
                .map_err(|err| Error::internal(format!("sealing group key failed: {err}")))?;
            Ok(GroupProvisionalMember {
                app_signature_public_key: user.app_signature_public_key,
                server_signature_public_key: user.server_signature_public_key,
                app_encryption_public_key: user.app_encryption_public_key,
                server_encryption_public_key: user.server_encryption_public_key,
                sealed_group_private_key: sealed,
            })
        })
        .collect()
}

fn write_members(out: &mut Vec<u8>, members: &[GroupMember]) {
    encode_varint(members.len() as u64, out);
    for member in members {
        out.extend_from_slice(member.user_id.as_bytes());
        out.extend_from_slice(member.public_user_encryption_key.as_bytes());
        out.extend_from_slice(&member.sealed_group_private_key);
    }
}

fn write_provisional_members(out: &mut Vec<u8>, members: &[GroupProvisionalMember]) {
    encode_varint(members.len() as u64, out);
    for member in members {
        out.extend_from_slice(member.app_signature_public_key.as_bytes());
        out.extend_from_slice(member.server_signature_public_key.as_bytes());
        out.extend_from_slice(member.app_encryption_public_key.as_bytes());
        out.extend_from_slice(member.server_encryption_public_key.as_bytes());
        out.extend_from_slice(&member.sealed_group_private_key);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| Error::internal("malformed group record"))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn take_count(&mut self) -> Result<usize> {
        let (count, read) = decode_varint(&self.bytes[self.offset..])
            .map_err(|_| Error::internal("malformed group record"))?;
        self.offset += read;
        usize::try_from(count).map_err(|_| Error::internal("malformed group record"))
    }

    fn finished(&self) -> bool {
        self.offset == self.bytes.len()
    }

    const fn consumed(&self) -> usize {
        self.offset
    }
}

fn read_members(reader: &mut Reader<'_>) -> Result<Vec<GroupMember>> {
    let count = reader.take_count()?;
    let mut members = Vec::with_capacity(count.min(super::MAX_GROUP_SIZE));
    for _ in 0..count {
        let entry = reader.take(MEMBER_ENTRY_SIZE)?;
        members.push(GroupMember {
            user_id: UserId::from_slice(&entry[..32])?,
            public_user_encryption_key: PublicEncryptionKey::from_slice(&entry[32..64])
                .map_err(|err| Error::internal(err.to_string()))?,
            sealed_group_private_key: entry[64..].to_vec(),
        });
    }
    Ok(members)
}

fn read_provisional_members(reader: &mut Reader<'_>) -> Result<Vec<GroupProvisionalMember>> {
    let count = reader.take_count()?;
    let mut members = Vec::with_capacity(count.min(super::MAX_GROUP_SIZE));
    for _ in 0..count {
        let entry = reader.take(PROVISIONAL_ENTRY_SIZE)?;
        members.push(GroupProvisionalMember {
            app_signature_public_key: PublicSignatureKey::from_slice(&entry[..32])
                .map_err(|err| Error::internal(err.to_string()))?,
            server_signature_public_key: PublicSignatureKey::from_slice(&entry[32..64])
                .map_err(|err| Error::internal(err.to_string()))?,
            app_encryption_public_key: PublicEncryptionKey::from_slice(&entry[64..96])
                .map_err(|err| Error::internal(err.to_string()))?,
            server_encryption_public_key: PublicEncryptionKey::from_slice(&entry[96..128])
                .map_err(|err| Error::internal(err.to_string()))?,
            sealed_group_private_key: entry[128..].to_vec(),
        });
    }
    Ok(members)
}

impl UserGroupCreation {
    /// Builds and self-signs a creation record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if any sealing step fails.
    pub fn new(
        signature_key_pair: &SignatureKeyPair,
        encryption_key_pair: &EncryptionKeyPair,
        users: &[PublicUser],
        provisional_users: &[ProvisionalMemberKeys],
    ) -> Result<Self> {
        let sealed_private_signature_key = seal(
            signature_key_pair.private_key.as_bytes(),
            &encryption_key_pair.public_key,
        )
        .map_err(|err| Error::internal(format!("sealing group key failed: {err}")))?;

        let mut record = Self {
            public_signature_key: signature_key_pair.public_key,
            public_encryption_key: encryption_key_pair.public_key,
            sealed_private_signature_key,
            members: seal_members(encryption_key_pair, users)?,
            provisional_members: seal_provisional_members(
                encryption_key_pair,
                provisional_users,
            )?,
            self_signature: Signature::from_bytes([0u8; SIGNATURE_SIZE]),
        };
        record.self_signature =
            sign(&record.signed_bytes(), &signature_key_pair.private_key);
        Ok(record)
    }

    fn signed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.public_signature_key.as_bytes());
        out.extend_from_slice(self.public_encryption_key.as_bytes());
        out.extend_from_slice(&self.sealed_private_signature_key);
        write_members(&mut out, &self.members);
        write_provisional_members(&mut out, &self.provisional_members);
        out
    }

    /// Serializes the record payload.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.signed_bytes();
        out.extend_from_slice(self.self_signature.as_bytes());
        out
    }

    /// Parses a creation payload, checking its self-signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] on malformed bytes or a bad signature.
    pub fn deserialize(payload: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(payload);
        let public_signature_key = PublicSignatureKey::from_slice(reader.take(32)?)
            .map_err(|err| Error::internal(err.to_string()))?;
        let public_encryption_key = PublicEncryptionKey::from_slice(reader.take(32)?)
            .map_err(|err| Error::internal(err.to_string()))?;
        let sealed_private_signature_key =
            reader.take(SEALED_SIGNATURE_KEY_SIZE)?.to_vec();
        let members = read_members(&mut reader)?;
        let provisional_members = read_provisional_members(&mut reader)?;
        let signed_len = reader.consumed();
        let self_signature = Signature::from_slice(reader.take(SIGNATURE_SIZE)?)
            .map_err(|err| Error::internal(err.to_string()))?;
        if !reader.finished() {
            return Err(Error::internal("malformed group record"));
        }

        verify(&payload[..signed_len], &self_signature, &public_signature_key)
            .map_err(|_| Error::internal("group record self-signature mismatch"))?;

        Ok(Self {
            public_signature_key,
            public_encryption_key,
            sealed_private_signature_key,
            members,
            provisional_members,
            self_signature,
        })
    }
}

impl UserGroupAddition {
    /// Builds and self-signs an addition record rotating the group key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if any sealing step fails.
    pub fn new(
        group_id: GroupId,
        signature_key_pair: &SignatureKeyPair,
        new_encryption_key_pair: &EncryptionKeyPair,
        users: &[PublicUser],
        provisional_users: &[ProvisionalMemberKeys],
    ) -> Result<Self> {
        let sealed_private_signature_key = seal(
            signature_key_pair.private_key.as_bytes(),
            &new_encryption_key_pair.public_key,
        )
        .map_err(|err| Error::internal(format!("sealing group key failed: {err}")))?;

        let mut record = Self {
            group_id,
            public_encryption_key: new_encryption_key_pair.public_key,
            sealed_private_signature_key,
            members: seal_members(new_encryption_key_pair, users)?,
            provisional_members: seal_provisional_members(
                new_encryption_key_pair,
                provisional_users,
            )?,
            self_signature: Signature::from_bytes([0u8; SIGNATURE_SIZE]),
        };
        record.self_signature =
            sign(&record.signed_bytes(), &signature_key_pair.private_key);
        Ok(record)
    }

    fn signed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.group_id.as_bytes());
        out.extend_from_slice(self.public_encryption_key.as_bytes());
        out.extend_from_slice(&self.sealed_private_signature_key);
        write_members(&mut out, &self.members);
        write_provisional_members(&mut out, &self.provisional_members);
        out
    }

    /// Serializes the record payload.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.signed_bytes();
        out.extend_from_slice(self.self_signature.as_bytes());
        out
    }

    /// Parses an addition payload.
    ///
    /// The self-signature is checked against the group id, which is the
    /// group's public signature key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] on malformed bytes or a bad signature.
    pub fn deserialize(payload: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(payload);
        let group_id = GroupId::from_slice(reader.take(32)?)?;
        let public_encryption_key = PublicEncryptionKey::from_slice(reader.take(32)?)
            .map_err(|err| Error::internal(err.to_string()))?;
        let sealed_private_signature_key =
            reader.take(SEALED_SIGNATURE_KEY_SIZE)?.to_vec();
        let members = read_members(&mut reader)?;
        let provisional_members = read_provisional_members(&mut reader)?;
        let signed_len = reader.consumed();
        let self_signature = Signature::from_slice(reader.take(SIGNATURE_SIZE)?)
            .map_err(|err| Error::internal(err.to_string()))?;
        if !reader.finished() {
            return Err(Error::internal("malformed group record"));
        }

        let group_signature_key = PublicSignatureKey::from_bytes(*group_id.as_bytes());
        verify(&payload[..signed_len], &self_signature, &group_signature_key)
            .map_err(|_| Error::internal("group record self-signature mismatch"))?;

        Ok(Self {
            group_id,
            public_encryption_key,
            sealed_private_signature_key,
            members,
            provisional_members,
            self_signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharekit_crypto::seal_open;

    fn user(byte: u8) -> (PublicUser, EncryptionKeyPair) {
        let keys = EncryptionKeyPair::generate();
        (
            PublicUser {
                user_id: UserId::from_bytes([byte; 32]),
                public_encryption_key: keys.public_key,
            },
            keys,
        )
    }

    #[test]
    fn test_creation_roundtrip() {
        let sig = SignatureKeyPair::generate();
        let enc = EncryptionKeyPair::generate();
        let (alice, alice_keys) = user(1);
        let (bob, _) = user(2);

        let record = UserGroupCreation::new(&sig, &enc, &[alice, bob], &[]).unwrap();
        let parsed = UserGroupCreation::deserialize(&record.serialize()).unwrap();
        assert_eq!(parsed, record);

        // A member can recover the group private key.
        let recovered = seal_open(
            &parsed.members[0].sealed_group_private_key,
            &alice_keys,
        )
        .unwrap();
        assert_eq!(recovered, enc.private_key.as_bytes());
    }

    #[test]
    fn test_creation_signature_is_checked() {
        let sig = SignatureKeyPair::generate();
        let enc = EncryptionKeyPair::generate();
        let (alice, _) = user(1);

        let record = UserGroupCreation::new(&sig, &enc, &[alice], &[]).unwrap();
        let mut payload = record.serialize();
        let last = payload.len() - 1;
        payload[last] ^= 0x01;
        assert!(matches!(
            UserGroupCreation::deserialize(&payload),
            Err(Error::Internal { .. })
        ));
    }

    #[test]
    fn test_addition_roundtrip_with_provisional_member() {
        let sig = SignatureKeyPair::generate();
        let group_id = GroupId::from_bytes(*sig.public_key.as_bytes());
        let new_enc = EncryptionKeyPair::generate();
        let (alice, _) = user(1);

        let provisional = ProvisionalMemberKeys {
            app_signature_public_key: SignatureKeyPair::generate().public_key,
            server_signature_public_key: SignatureKeyPair::generate().public_key,
            app_encryption_public_key: EncryptionKeyPair::generate().public_key,
            server_encryption_public_key: EncryptionKeyPair::generate().public_key,
        };

        let record =
            UserGroupAddition::new(group_id, &sig, &new_enc, &[alice], &[provisional])
                .unwrap();
        let parsed = UserGroupAddition::deserialize(&record.serialize()).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.provisional_members.len(), 1);
    }

    #[test]
    fn test_record_dispatch_by_nature() {
        let sig = SignatureKeyPair::generate();
        let enc = EncryptionKeyPair::generate();
        let (alice, _) = user(1);
        let record = UserGroupCreation::new(&sig, &enc, &[alice], &[]).unwrap();

        let parsed =
            UserGroupRecord::deserialize(Nature::UserGroupCreation.wire(), &record.serialize())
                .unwrap();
        assert_eq!(parsed.group_id(), GroupId::from_bytes(*sig.public_key.as_bytes()));

        assert!(matches!(
            UserGroupRecord::deserialize(Nature::KeyPublishToUser.wire(), &record.serialize()),
            Err(Error::Internal { .. })
        ));
    }

    #[test]
    fn test_truncated_record_rejected() {
        let sig = SignatureKeyPair::generate();
        let enc = EncryptionKeyPair::generate();
        let (alice, _) = user(1);
        let record = UserGroupCreation::new(&sig, &enc, &[alice], &[]).unwrap();
        let payload = record.serialize();
        assert!(matches!(
            UserGroupCreation::deserialize(&payload[..payload.len() - 3]),
            Err(Error::Internal { .. })
        ));
    }
}
