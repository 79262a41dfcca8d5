//! Group lifecycle and key-pair resolution.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use sharekit_crypto::{EncryptionKeyPair, PublicEncryptionKey, SignatureKeyPair};

use super::records::{
    ProvisionalMemberKeys, UserGroupAddition, UserGroupCreation, UserGroupRecord,
};
use super::replay::{replay_group_history, GroupState};
use super::MAX_GROUP_SIZE;
use crate::block::{Nature, Record, VerifiedBlock};
use crate::client::{Client, PublicUser};
use crate::identity::partition_identities;
use crate::keystore::SharedKeystore;
use crate::provisional::{ProvisionalManager, PublicProvisionalUser};
use crate::store::{GroupKeyRecord, GroupStore};
use crate::types::GroupId;
use crate::{Error, Result};

/// Creates groups, rotates their membership, and resolves their keys.
pub struct GroupManager {
    client: Arc<dyn Client>,
    store: Arc<dyn GroupStore>,
    keystore: SharedKeystore,
    provisional: Arc<ProvisionalManager>,
    // At most one history replay runs at a time; concurrent lookups for
    // the same group coalesce behind this lock instead of replaying
    // twice.
    replay_lock: Mutex<()>,
}

impl GroupManager {
    /// Creates a manager over the injected collaborators.
    #[must_use]
    pub fn new(
        client: Arc<dyn Client>,
        store: Arc<dyn GroupStore>,
        keystore: SharedKeystore,
        provisional: Arc<ProvisionalManager>,
    ) -> Self {
        Self {
            client,
            store,
            keystore,
            provisional,
            replay_lock: Mutex::new(()),
        }
    }

    /// Creates a group from member public identities and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] on an empty member list or a
    /// malformed identity and [`Error::GroupTooBig`] above
    /// [`MAX_GROUP_SIZE`] members.
    pub async fn create_group(&self, member_identities: &[String]) -> Result<GroupId> {
        check_member_count(member_identities)?;
        let (users, provisional_users) =
            self.resolve_members(member_identities).await?;

        let signature_key_pair = SignatureKeyPair::generate();
        let encryption_key_pair = EncryptionKeyPair::generate();
        let provisional_member_keys: Vec<ProvisionalMemberKeys> =
            provisional_users.iter().map(Into::into).collect();
        let record = UserGroupCreation::new(
            &signature_key_pair,
            &encryption_key_pair,
            &users,
            &provisional_member_keys,
        )?;
        let group_id = GroupId::from_bytes(*signature_key_pair.public_key.as_bytes());

        self.client
            .create_group(Record {
                nature: Nature::UserGroupCreation,
                payload: record.serialize(),
            })
            .await?;

        self.store
            .save_group_encryption_keys(&[GroupKeyRecord {
                group_id,
                public_encryption_key: encryption_key_pair.public_key,
                private_encryption_key: Some(encryption_key_pair.private_key),
            }])
            .await?;

        tracing::debug!(group_id = %group_id, members = users.len(), "created group");
        Ok(group_id)
    }

    /// Adds members to a group, rotating its encryption key pair.
    ///
    /// The local user must currently be a member.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an unknown group, a
    /// non-member caller, or malformed identities, and
    /// [`Error::GroupTooBig`] above [`MAX_GROUP_SIZE`] added members.
    pub async fn update_group_members(
        &self,
        group_id: GroupId,
        member_identities: &[String],
    ) -> Result<()> {
        check_member_count(member_identities)?;

        let state = self.fetch_and_replay_by_ids(&[group_id]).await?.remove(&group_id)
            .ok_or_else(|| Error::invalid_argument(format!("group not found: {group_id}")))?;
        self.persist_state(&state).await?;
        let signature_key_pair = state.signature_key_pair.clone().ok_or_else(|| {
            Error::invalid_argument("Current user is not a group member")
        })?;

        let (new_users, new_provisional_users) =
            self.resolve_members(member_identities).await?;

        // Rotation re-seals for everyone: existing membership (at its
        // recorded keys) plus the newcomers, newcomers winning on
        // duplicates.
        let mut users: Vec<PublicUser> = state
            .members
            .iter()
            .map(|member| PublicUser {
                user_id: member.user_id,
                public_encryption_key: member.public_user_encryption_key,
            })
            .filter(|existing| {
                !new_users.iter().any(|new| new.user_id == existing.user_id)
            })
            .collect();
        users.extend(new_users);

        let mut provisional_members: Vec<ProvisionalMemberKeys> = state
            .provisional_members
            .iter()
            .filter(|existing| {
                !new_provisional_users.iter().any(|new| {
                    new.app_signature_public_key == existing.app_signature_public_key
                })
            })
            .map(Into::into)
            .collect();
        provisional_members.extend(new_provisional_users.iter().map(ProvisionalMemberKeys::from));

        let new_encryption_key_pair = EncryptionKeyPair::generate();
        let record = UserGroupAddition::new(
            group_id,
            &signature_key_pair,
            &new_encryption_key_pair,
            &users,
            &provisional_members,
        )?;

        self.client
            .patch_group(Record {
                nature: Nature::UserGroupAddition,
                payload: record.serialize(),
            })
            .await?;

        self.store
            .save_group_encryption_keys(&[GroupKeyRecord {
                group_id,
                public_encryption_key: new_encryption_key_pair.public_key,
                private_encryption_key: Some(new_encryption_key_pair.private_key),
            }])
            .await?;

        tracing::debug!(group_id = %group_id, members = users.len(), "rotated group key");
        Ok(())
    }

    /// Resolves each group id to its current public encryption key, in
    /// the caller's order.
    ///
    /// Cached keys are served from the group store; missing groups are
    /// fetched and replayed once each.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a group without history.
    pub async fn get_groups_public_encryption_keys(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Vec<PublicEncryptionKey>> {
        let mut known: HashMap<GroupId, PublicEncryptionKey> = self
            .store
            .find_groups_public_keys(group_ids)
            .await?
            .into_iter()
            .collect();

        let mut missing: Vec<GroupId> = Vec::new();
        for group_id in group_ids {
            if !known.contains_key(group_id) && !missing.contains(group_id) {
                missing.push(*group_id);
            }
        }

        if !missing.is_empty() {
            tracing::debug!(count = missing.len(), "fetching unknown group histories");
            let replayed = self.fetch_and_replay_by_ids(&missing).await?;
            for group_id in &missing {
                let state = replayed.get(group_id).ok_or_else(|| {
                    Error::invalid_argument(format!("group not found: {group_id}"))
                })?;
                self.persist_state(state).await?;
                known.insert(*group_id, state.public_encryption_key);
            }
        }

        group_ids
            .iter()
            .map(|group_id| {
                known.get(group_id).copied().ok_or_else(|| {
                    Error::invalid_argument(format!("group not found: {group_id}"))
                })
            })
            .collect()
    }

    /// Resolves a group public encryption key to its full key pair.
    ///
    /// Only works for internal groups; the result is cached in the group
    /// store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when the group is unknown or
    /// the local user is not a member.
    pub async fn get_group_encryption_key_pair(
        &self,
        public_encryption_key: &PublicEncryptionKey,
    ) -> Result<EncryptionKeyPair> {
        if let Some(pair) = self
            .store
            .find_group_encryption_key_pair(public_encryption_key)
            .await?
        {
            return Ok(pair);
        }

        let _replaying = self.replay_lock.lock().await;
        // A replay that finished while this call waited may have filled
        // the cache.
        if let Some(pair) = self
            .store
            .find_group_encryption_key_pair(public_encryption_key)
            .await?
        {
            return Ok(pair);
        }

        let blocks = self
            .client
            .get_group_histories_by_key(public_encryption_key)
            .await?;
        if blocks.is_empty() {
            return Err(Error::invalid_argument("group not found"));
        }
        let state = {
            let keystore = self.keystore.read().await;
            replay_group_history(&blocks, &keystore)?
        };
        self.persist_state(&state).await?;

        // Key publishes may be sealed to any historic generation of the
        // group key, so resolve the requested key, not just the youngest.
        state
            .find_key_entry(public_encryption_key)
            .ok_or_else(|| Error::invalid_argument("group not found"))?
            .encryption_key_pair
            .clone()
            .ok_or_else(|| Error::invalid_argument("Current user is not a group member"))
    }

    // Parses member identities and resolves both recipient kinds.
    async fn resolve_members(
        &self,
        member_identities: &[String],
    ) -> Result<(Vec<PublicUser>, Vec<PublicProvisionalUser>)> {
        let (permanent, provisional) = partition_identities(member_identities)?;
        let user_ids: Vec<_> = permanent.iter().map(|identity| identity.user_id).collect();
        let users = if user_ids.is_empty() {
            Vec::new()
        } else {
            self.client.get_public_user_keys(&user_ids).await?
        };
        let provisional_users = self.provisional.get_provisional_users(&provisional).await?;
        Ok((users, provisional_users))
    }

    // Fetches and replays histories for several groups, bucketed by id.
    async fn fetch_and_replay_by_ids(
        &self,
        group_ids: &[GroupId],
    ) -> Result<HashMap<GroupId, GroupState>> {
        let _replaying = self.replay_lock.lock().await;
        let blocks = self.client.get_group_histories_by_ids(group_ids).await?;

        let mut buckets: HashMap<GroupId, Vec<VerifiedBlock>> = HashMap::new();
        for block in blocks {
            let record = UserGroupRecord::deserialize(block.nature, &block.payload)?;
            buckets.entry(record.group_id()).or_default().push(block);
        }

        let keystore = self.keystore.read().await;
        let mut states = HashMap::new();
        for (group_id, group_blocks) in buckets {
            states.insert(group_id, replay_group_history(&group_blocks, &keystore)?);
        }
        Ok(states)
    }

    // Persists every key generation, oldest first, so the store learns
    // both the historic pairs and the current public key.
    async fn persist_state(&self, state: &GroupState) -> Result<()> {
        let records: Vec<GroupKeyRecord> = state
            .key_history
            .iter()
            .map(|entry| GroupKeyRecord {
                group_id: state.group_id,
                public_encryption_key: entry.public_encryption_key,
                private_encryption_key: entry
                    .encryption_key_pair
                    .as_ref()
                    .map(|pair| pair.private_key.clone()),
            })
            .collect();
        self.store.save_group_encryption_keys(&records).await
    }
}

fn check_member_count(member_identities: &[String]) -> Result<()> {
    if member_identities.is_empty() {
        return Err(Error::invalid_argument("no members in the group"));
    }
    if member_identities.len() > MAX_GROUP_SIZE {
        return Err(Error::GroupTooBig {
            size: member_identities.len(),
            max: MAX_GROUP_SIZE,
        });
    }
    Ok(())
}
