//! Deriving a group's current keys from its record history.

use sharekit_crypto::{
    seal_open, EncryptionKeyPair, PrivateEncryptionKey, PrivateSignatureKey,
    PublicEncryptionKey, PublicSignatureKey, SignatureKeyPair,
};

use super::records::{GroupMember, GroupProvisionalMember, UserGroupRecord};
use crate::block::VerifiedBlock;
use crate::keystore::LocalUserKeystore;
use crate::types::GroupId;
use crate::{Error, Result};

/// One generation of a group's encryption key, oldest first in
/// [`GroupState::key_history`].
#[derive(Debug, Clone)]
pub struct GroupKeyEntry {
    /// The generation's public encryption key.
    pub public_encryption_key: PublicEncryptionKey,
    /// The matching pair, when the local user was a member of that
    /// generation.
    pub encryption_key_pair: Option<EncryptionKeyPair>,
}

/// A group's state after replaying its full history.
///
/// The group is *internal* when `encryption_key_pair` is present: the
/// local user recovered the current private key through one of their user
/// keys or a claimed provisional identity. The classification is derived
/// and time-varying; only the state at the end of the log counts.
/// Superseded generations stay in `key_history` so key publishes sealed
/// to an older group key remain decryptable.
#[derive(Debug, Clone)]
pub struct GroupState {
    /// The group.
    pub group_id: GroupId,
    /// The group's public signature key.
    pub public_signature_key: PublicSignatureKey,
    /// The current (youngest) public encryption key.
    pub public_encryption_key: PublicEncryptionKey,
    /// The current key pair, present only for internal groups.
    pub encryption_key_pair: Option<EncryptionKeyPair>,
    /// The group signature key pair, recoverable alongside the
    /// encryption key.
    pub signature_key_pair: Option<SignatureKeyPair>,
    /// Every encryption-key generation, oldest first; the youngest is
    /// authoritative for new key publishes.
    pub key_history: Vec<GroupKeyEntry>,
    /// Permanent membership as of the youngest record.
    pub members: Vec<GroupMember>,
    /// Provisional membership as of the youngest record.
    pub provisional_members: Vec<GroupProvisionalMember>,
}

impl GroupState {
    /// Whether the local user currently holds the group private key.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        self.encryption_key_pair.is_some()
    }

    /// Finds the key generation with the given public key.
    #[must_use]
    pub fn find_key_entry(
        &self,
        public_encryption_key: &PublicEncryptionKey,
    ) -> Option<&GroupKeyEntry> {
        self.key_history
            .iter()
            .find(|entry| entry.public_encryption_key == *public_encryption_key)
    }
}

/// Replays a group's history and derives its current keys.
///
/// Records must be in log order and belong to one group; the first must
/// be the creation. Each addition replaces the encryption key pair. The
/// local user's access is re-evaluated per record, so access gained or
/// lost mid-history resolves to whatever the youngest record grants.
///
/// # Errors
///
/// Returns [`Error::Internal`] on an empty, malformed, or inconsistent
/// history.
pub fn replay_group_history(
    blocks: &[VerifiedBlock],
    keystore: &LocalUserKeystore,
) -> Result<GroupState> {
    let mut state: Option<GroupState> = None;

    for block in blocks {
        let record = UserGroupRecord::deserialize(block.nature, &block.payload)?;
        match (record, &mut state) {
            (UserGroupRecord::Creation(creation), None) => {
                let encryption_key_pair = recover_private_key(
                    keystore,
                    creation.public_encryption_key,
                    &creation.members,
                    &creation.provisional_members,
                )?;
                let signature_key_pair = recover_signature_key(
                    encryption_key_pair.as_ref(),
                    &creation.sealed_private_signature_key,
                    creation.public_signature_key,
                )?;
                state = Some(GroupState {
                    group_id: GroupId::from_bytes(*creation.public_signature_key.as_bytes()),
                    public_signature_key: creation.public_signature_key,
                    public_encryption_key: creation.public_encryption_key,
                    encryption_key_pair: encryption_key_pair.clone(),
                    signature_key_pair,
                    key_history: vec![GroupKeyEntry {
                        public_encryption_key: creation.public_encryption_key,
                        encryption_key_pair,
                    }],
                    members: creation.members,
                    provisional_members: creation.provisional_members,
                });
            }
            (UserGroupRecord::Creation(_), Some(_)) => {
                return Err(Error::internal("group history has two creation records"));
            }
            (UserGroupRecord::Addition(addition), Some(current)) => {
                if addition.group_id != current.group_id {
                    return Err(Error::internal("group history mixes groups"));
                }
                let encryption_key_pair = recover_private_key(
                    keystore,
                    addition.public_encryption_key,
                    &addition.members,
                    &addition.provisional_members,
                )?;
                let signature_key_pair = recover_signature_key(
                    encryption_key_pair.as_ref(),
                    &addition.sealed_private_signature_key,
                    current.public_signature_key,
                )?;
                current.public_encryption_key = addition.public_encryption_key;
                current.encryption_key_pair = encryption_key_pair.clone();
                current.signature_key_pair = signature_key_pair;
                current.key_history.push(GroupKeyEntry {
                    public_encryption_key: addition.public_encryption_key,
                    encryption_key_pair,
                });
                current.members = addition.members;
                current.provisional_members = addition.provisional_members;
            }
            (UserGroupRecord::Addition(_), None) => {
                return Err(Error::internal(
                    "group history starts with an addition record",
                ));
            }
        }
    }

    state.ok_or_else(|| Error::internal("empty group history"))
}

// Tries every member entry against the local user's keys; the private
// half stays absent when none matches.
fn recover_private_key(
    keystore: &LocalUserKeystore,
    public_encryption_key: PublicEncryptionKey,
    members: &[GroupMember],
    provisional_members: &[GroupProvisionalMember],
) -> Result<Option<EncryptionKeyPair>> {
    for member in members {
        let Some(user_key) = keystore.find_user_key(&member.public_user_encryption_key)
        else {
            continue;
        };
        let private = seal_open(&member.sealed_group_private_key, &user_key)
            .map_err(|_| Error::internal("group member entry does not unseal"))?;
        return Ok(Some(build_pair(public_encryption_key, &private)?));
    }

    for member in provisional_members {
        let Some(keys) = keystore.find_provisional_key(
            &member.app_signature_public_key,
            &member.server_signature_public_key,
        ) else {
            continue;
        };
        let inner = seal_open(
            &member.sealed_group_private_key,
            &keys.server_encryption_key_pair,
        )
        .map_err(|_| Error::internal("group provisional entry does not unseal"))?;
        let private = seal_open(&inner, &keys.app_encryption_key_pair)
            .map_err(|_| Error::internal("group provisional entry does not unseal"))?;
        return Ok(Some(build_pair(public_encryption_key, &private)?));
    }

    Ok(None)
}

fn build_pair(
    public_encryption_key: PublicEncryptionKey,
    private: &[u8],
) -> Result<EncryptionKeyPair> {
    let private = PrivateEncryptionKey::from_slice(private)
        .map_err(|_| Error::internal("group private key has the wrong length"))?;
    let pair = EncryptionKeyPair::from_private_key(private);
    if pair.public_key != public_encryption_key {
        return Err(Error::internal(
            "group private key does not match the published public key",
        ));
    }
    Ok(pair)
}

fn recover_signature_key(
    encryption_key_pair: Option<&EncryptionKeyPair>,
    sealed_private_signature_key: &[u8],
    public_signature_key: PublicSignatureKey,
) -> Result<Option<SignatureKeyPair>> {
    let Some(encryption_key_pair) = encryption_key_pair else {
        return Ok(None);
    };
    let seed = seal_open(sealed_private_signature_key, encryption_key_pair)
        .map_err(|_| Error::internal("group signature key does not unseal"))?;
    let seed: [u8; 32] = seed
        .try_into()
        .map_err(|_| Error::internal("group signature key has the wrong length"))?;
    let pair = SignatureKeyPair::from_private_key(PrivateSignatureKey::from_bytes(seed));
    if pair.public_key != public_signature_key {
        return Err(Error::internal(
            "group signature key does not match the group id",
        ));
    }
    Ok(Some(pair))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::block::Nature;
    use crate::client::PublicUser;
    use crate::groups::records::{UserGroupAddition, UserGroupCreation};
    use crate::keystore::LocalUserKeystore;
    use crate::testing::MemoryBlobStore;
    use crate::types::{AppId, UserId};
    use sharekit_crypto::SymmetricKey;

    async fn keystore_with_user_key() -> (LocalUserKeystore, EncryptionKeyPair) {
        let mut keystore = LocalUserKeystore::open(
            AppId::from_bytes([1; 32]),
            UserId::from_bytes([2; 32]),
            SymmetricKey::generate(),
            Arc::new(MemoryBlobStore::default()),
        )
        .await
        .unwrap();
        let user_key = EncryptionKeyPair::generate();
        keystore.add_user_key(user_key.clone()).await.unwrap();
        (keystore, user_key)
    }

    fn block(nature: Nature, payload: Vec<u8>, index: u64) -> VerifiedBlock {
        VerifiedBlock {
            nature: nature.wire(),
            payload,
            author: [0u8; 32],
            signature: sharekit_crypto::Signature::from_bytes([0u8; 64]),
            index,
        }
    }

    #[tokio::test]
    async fn test_member_recovers_rotated_keys() {
        let (keystore, user_key) = keystore_with_user_key().await;
        let me = PublicUser {
            user_id: keystore.user_id(),
            public_encryption_key: user_key.public_key,
        };

        let group_sig = SignatureKeyPair::generate();
        let first_enc = EncryptionKeyPair::generate();
        let creation = UserGroupCreation::new(&group_sig, &first_enc, &[me.clone()], &[])
            .unwrap();
        let group_id = GroupId::from_bytes(*group_sig.public_key.as_bytes());

        let second_enc = EncryptionKeyPair::generate();
        let addition =
            UserGroupAddition::new(group_id, &group_sig, &second_enc, &[me], &[]).unwrap();

        let blocks = vec![
            block(Nature::UserGroupCreation, creation.serialize(), 0),
            block(Nature::UserGroupAddition, addition.serialize(), 1),
        ];
        let state = replay_group_history(&blocks, &keystore).unwrap();

        // The youngest pair is authoritative; the superseded one stays
        // reachable through the history.
        assert!(state.is_internal());
        assert_eq!(state.public_encryption_key, second_enc.public_key);
        assert_eq!(
            state.encryption_key_pair.as_ref().unwrap().public_key,
            second_enc.public_key
        );
        assert_eq!(state.key_history.len(), 2);
        assert!(state
            .find_key_entry(&first_enc.public_key)
            .and_then(|entry| entry.encryption_key_pair.as_ref())
            .is_some());
        assert_eq!(
            state.signature_key_pair.as_ref().unwrap().public_key,
            group_sig.public_key
        );
    }

    #[tokio::test]
    async fn test_non_member_sees_external_group() {
        let (keystore, _) = keystore_with_user_key().await;
        let stranger = PublicUser {
            user_id: UserId::from_bytes([9; 32]),
            public_encryption_key: EncryptionKeyPair::generate().public_key,
        };

        let group_sig = SignatureKeyPair::generate();
        let group_enc = EncryptionKeyPair::generate();
        let creation =
            UserGroupCreation::new(&group_sig, &group_enc, &[stranger], &[]).unwrap();

        let state = replay_group_history(
            &[block(Nature::UserGroupCreation, creation.serialize(), 0)],
            &keystore,
        )
        .unwrap();
        assert!(!state.is_internal());
        assert!(state.signature_key_pair.is_none());
        assert_eq!(state.public_encryption_key, group_enc.public_key);
    }

    #[tokio::test]
    async fn test_claimed_provisional_member_is_internal() {
        let (mut keystore, _) = keystore_with_user_key().await;

        let app_sig = SignatureKeyPair::generate();
        let server_sig = SignatureKeyPair::generate();
        let app_enc = EncryptionKeyPair::generate();
        let server_enc = EncryptionKeyPair::generate();
        keystore
            .add_provisional_key(
                &app_sig.public_key,
                &server_sig.public_key,
                crate::keystore::ProvisionalUserKeys {
                    app_encryption_key_pair: app_enc.clone(),
                    server_encryption_key_pair: server_enc.clone(),
                },
            )
            .await
            .unwrap();

        let member = crate::groups::ProvisionalMemberKeys {
            app_signature_public_key: app_sig.public_key,
            server_signature_public_key: server_sig.public_key,
            app_encryption_public_key: app_enc.public_key,
            server_encryption_public_key: server_enc.public_key,
        };
        let group_sig = SignatureKeyPair::generate();
        let group_enc = EncryptionKeyPair::generate();
        let creation =
            UserGroupCreation::new(&group_sig, &group_enc, &[], &[member]).unwrap();

        let state = replay_group_history(
            &[block(Nature::UserGroupCreation, creation.serialize(), 0)],
            &keystore,
        )
        .unwrap();
        assert!(state.is_internal());
    }

    #[tokio::test]
    async fn test_malformed_histories_rejected() {
        let (keystore, user_key) = keystore_with_user_key().await;
        let me = PublicUser {
            user_id: keystore.user_id(),
            public_encryption_key: user_key.public_key,
        };
        let group_sig = SignatureKeyPair::generate();
        let group_enc = EncryptionKeyPair::generate();
        let creation =
            UserGroupCreation::new(&group_sig, &group_enc, &[me.clone()], &[]).unwrap();
        let addition = UserGroupAddition::new(
            GroupId::from_bytes(*group_sig.public_key.as_bytes()),
            &group_sig,
            &EncryptionKeyPair::generate(),
            &[me],
            &[],
        )
        .unwrap();

        // Empty history.
        assert!(matches!(
            replay_group_history(&[], &keystore),
            Err(Error::Internal { .. })
        ));
        // Addition without a creation.
        assert!(matches!(
            replay_group_history(
                &[block(Nature::UserGroupAddition, addition.serialize(), 0)],
                &keystore,
            ),
            Err(Error::Internal { .. })
        ));
        // Two creations.
        assert!(matches!(
            replay_group_history(
                &[
                    block(Nature::UserGroupCreation, creation.serialize(), 0),
                    block(Nature::UserGroupCreation, creation.serialize(), 1),
                ],
                &keystore,
            ),
            Err(Error::Internal { .. })
        ));
    }
}
