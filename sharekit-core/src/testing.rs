//! In-memory collaborator implementations.
//!
//! These back the test suites and double as reference implementations of
//! the collaborator traits: a [`FakeServer`] that stores published
//! records and serves them back with the selection rules of the real
//! service, plus memory-backed stores.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sharekit_crypto::{
    EncryptionKeyPair, PublicEncryptionKey, Signature, SignatureKeyPair, SymmetricKey,
};

use crate::block::{Nature, Record, VerifiedBlock};
use crate::client::{
    Client, ProvisionalKeyRequest, ProvisionalKeysResponse, PublicUser,
    ServerProvisionalKeys, ServerProvisionalPublicKeys,
};
use crate::groups::UserGroupRecord;
use crate::identity::ProvisionalTarget;
use crate::publish::KeyPublishRecord;
use crate::store::{BlobStore, GroupKeyRecord, GroupStore, ResourceStore};
use crate::types::{GroupId, ResourceId, UserId};
use crate::{Error, Result, Verification};

/// In-memory [`ResourceStore`].
#[derive(Default)]
pub struct MemoryResourceStore {
    keys: Mutex<HashMap<ResourceId, SymmetricKey>>,
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn save_key(&self, resource_id: ResourceId, key: SymmetricKey) -> Result<()> {
        self.keys.lock().expect("store mutex").insert(resource_id, key);
        Ok(())
    }

    async fn find_key(&self, resource_id: ResourceId) -> Result<Option<SymmetricKey>> {
        Ok(self.keys.lock().expect("store mutex").get(&resource_id).cloned())
    }
}

/// In-memory [`GroupStore`]. Keeps every key generation and tracks the
/// youngest per group.
#[derive(Default)]
pub struct MemoryGroupStore {
    generations: Mutex<HashMap<PublicEncryptionKey, GroupKeyRecord>>,
    current: Mutex<HashMap<GroupId, PublicEncryptionKey>>,
}

#[async_trait]
impl GroupStore for MemoryGroupStore {
    async fn save_group_encryption_keys(&self, records: &[GroupKeyRecord]) -> Result<()> {
        let mut generations = self.generations.lock().expect("store mutex");
        let mut current = self.current.lock().expect("store mutex");
        for record in records {
            generations.insert(record.public_encryption_key, record.clone());
            current.insert(record.group_id, record.public_encryption_key);
        }
        Ok(())
    }

    async fn find_group_encryption_key_pair(
        &self,
        public_encryption_key: &PublicEncryptionKey,
    ) -> Result<Option<EncryptionKeyPair>> {
        let generations = self.generations.lock().expect("store mutex");
        Ok(generations.get(public_encryption_key).and_then(|record| {
            record
                .private_encryption_key
                .clone()
                .map(EncryptionKeyPair::from_private_key)
        }))
    }

    async fn find_groups_public_keys(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Vec<(GroupId, PublicEncryptionKey)>> {
        let current = self.current.lock().expect("store mutex");
        Ok(group_ids
            .iter()
            .filter_map(|group_id| {
                current.get(group_id).map(|public_key| (*group_id, *public_key))
            })
            .collect())
    }
}

/// In-memory [`BlobStore`].
#[derive(Default)]
pub struct MemoryBlobStore {
    blob: Mutex<Option<Vec<u8>>>,
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.blob.lock().expect("store mutex").clone())
    }

    async fn save(&self, blob: Vec<u8>) -> Result<()> {
        *self.blob.lock().expect("store mutex") = Some(blob);
        Ok(())
    }
}

struct ProvisionalEntry {
    keys: ServerProvisionalKeys,
    verification_required: bool,
}

#[derive(Default)]
struct ServerState {
    next_index: u64,
    users: HashMap<UserId, PublicEncryptionKey>,
    key_publishes: Vec<VerifiedBlock>,
    group_histories: HashMap<GroupId, Vec<VerifiedBlock>>,
    group_ids_by_key: HashMap<PublicEncryptionKey, GroupId>,
    provisional: HashMap<(ProvisionalTarget, [u8; 32]), ProvisionalEntry>,
    claims: Vec<VerifiedBlock>,
}

/// An in-memory stand-in for the record service shared by every client
/// in a test: stores published blocks and serves them back verified.
#[derive(Default)]
pub struct FakeServer {
    state: Mutex<ServerState>,
}

/// The verification code the fake server accepts.
pub const VALID_VERIFICATION_CODE: &str = "12345678";

impl FakeServer {
    /// Creates an empty server.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a [`Client`] bound to one user's view of this server.
    #[must_use]
    pub fn client_for(self: &Arc<Self>, user_id: UserId) -> Arc<FakeClient> {
        Arc::new(FakeClient {
            server: self.clone(),
            user_id,
        })
    }

    /// Registers (or rotates) a user's current public user key.
    pub fn register_user(&self, user_id: UserId, public_key: PublicEncryptionKey) {
        self.state
            .lock()
            .expect("server mutex")
            .users
            .insert(user_id, public_key);
    }

    /// Marks a provisional identifier as requiring verification before
    /// its private keys are released.
    pub fn require_verification(&self, target: ProvisionalTarget, hashed_value: [u8; 32]) {
        let mut state = self.state.lock().expect("server mutex");
        Self::provisional_entry(&mut state, target, hashed_value).verification_required =
            true;
    }

    /// The number of key-publish blocks stored.
    #[must_use]
    pub fn key_publish_count(&self) -> usize {
        self.state.lock().expect("server mutex").key_publishes.len()
    }

    /// The number of claim blocks stored.
    #[must_use]
    pub fn claim_count(&self) -> usize {
        self.state.lock().expect("server mutex").claims.len()
    }

    fn provisional_entry<'state>(
        state: &'state mut ServerState,
        target: ProvisionalTarget,
        hashed_value: [u8; 32],
    ) -> &'state mut ProvisionalEntry {
        state
            .provisional
            .entry((target, hashed_value))
            .or_insert_with(|| ProvisionalEntry {
                keys: ServerProvisionalKeys {
                    signature_key_pair: SignatureKeyPair::generate(),
                    encryption_key_pair: EncryptionKeyPair::generate(),
                },
                verification_required: false,
            })
    }

    fn wrap(state: &mut ServerState, record: Record) -> VerifiedBlock {
        let index = state.next_index;
        state.next_index += 1;
        VerifiedBlock {
            nature: record.nature.wire(),
            payload: record.payload,
            author: [0u8; 32],
            signature: Signature::from_bytes([0u8; 64]),
            index,
        }
    }

    fn store_group_record(state: &mut ServerState, record: Record) -> Result<()> {
        let parsed = UserGroupRecord::deserialize(record.nature.wire(), &record.payload)?;
        let group_id = parsed.group_id();
        let public_key = match &parsed {
            UserGroupRecord::Creation(creation) => creation.public_encryption_key,
            UserGroupRecord::Addition(addition) => addition.public_encryption_key,
        };
        if matches!(parsed, UserGroupRecord::Addition(_))
            && !state.group_histories.contains_key(&group_id)
        {
            return Err(Error::invalid_argument("unknown group"));
        }
        let block = Self::wrap(state, record);
        state.group_histories.entry(group_id).or_default().push(block);
        state.group_ids_by_key.insert(public_key, group_id);
        Ok(())
    }
}

/// One user's authenticated connection to a [`FakeServer`].
pub struct FakeClient {
    server: Arc<FakeServer>,
    user_id: UserId,
}

#[async_trait]
impl Client for FakeClient {
    async fn publish_resource_keys(&self, records: Vec<Record>) -> Result<()> {
        let mut state = self.server.state.lock().expect("server mutex");
        for record in records {
            // Reject malformed payloads the way a validating server
            // would.
            KeyPublishRecord::deserialize(record.nature.wire(), &record.payload)?;
            let block = FakeServer::wrap(&mut state, record);
            state.key_publishes.push(block);
        }
        Ok(())
    }

    async fn fetch_resource_key(
        &self,
        resource_id: ResourceId,
    ) -> Result<Option<VerifiedBlock>> {
        let state = self.server.state.lock().expect("server mutex");
        let my_key = state.users.get(&self.user_id);

        let mut group_or_provisional = None;
        for block in &state.key_publishes {
            let record = KeyPublishRecord::deserialize(block.nature, &block.payload)?;
            if record.resource_id() != resource_id {
                continue;
            }
            match record {
                KeyPublishRecord::ToUser { recipient, .. } => {
                    // User publishes are only visible to their recipient.
                    if Some(&recipient) == my_key {
                        return Ok(Some(block.clone()));
                    }
                }
                KeyPublishRecord::ToGroup { .. } | KeyPublishRecord::ToProvisional { .. } => {
                    group_or_provisional.get_or_insert_with(|| block.clone());
                }
            }
        }
        Ok(group_or_provisional)
    }

    async fn get_public_user_keys(&self, user_ids: &[UserId]) -> Result<Vec<PublicUser>> {
        let state = self.server.state.lock().expect("server mutex");
        user_ids
            .iter()
            .map(|user_id| {
                state
                    .users
                    .get(user_id)
                    .map(|public_key| PublicUser {
                        user_id: *user_id,
                        public_encryption_key: *public_key,
                    })
                    .ok_or_else(|| {
                        Error::invalid_argument(format!("unknown recipient: {user_id}"))
                    })
            })
            .collect()
    }

    async fn get_public_provisional_identities(
        &self,
        requests: &[ProvisionalKeyRequest],
    ) -> Result<Vec<ServerProvisionalPublicKeys>> {
        let mut state = self.server.state.lock().expect("server mutex");
        Ok(requests
            .iter()
            .map(|request| {
                let entry = FakeServer::provisional_entry(
                    &mut state,
                    request.target,
                    request.hashed_value,
                );
                ServerProvisionalPublicKeys {
                    signature_public_key: entry.keys.signature_key_pair.public_key,
                    encryption_public_key: entry.keys.encryption_key_pair.public_key,
                }
            })
            .collect())
    }

    async fn get_group_histories_by_ids(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Vec<VerifiedBlock>> {
        let state = self.server.state.lock().expect("server mutex");
        Ok(group_ids
            .iter()
            .flat_map(|group_id| {
                state
                    .group_histories
                    .get(group_id)
                    .cloned()
                    .unwrap_or_default()
            })
            .collect())
    }

    async fn get_group_histories_by_key(
        &self,
        public_encryption_key: &PublicEncryptionKey,
    ) -> Result<Vec<VerifiedBlock>> {
        let state = self.server.state.lock().expect("server mutex");
        Ok(state
            .group_ids_by_key
            .get(public_encryption_key)
            .and_then(|group_id| state.group_histories.get(group_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_group(&self, record: Record) -> Result<()> {
        if record.nature != Nature::UserGroupCreation {
            return Err(Error::invalid_argument("expected a group creation record"));
        }
        let mut state = self.server.state.lock().expect("server mutex");
        FakeServer::store_group_record(&mut state, record)
    }

    async fn patch_group(&self, record: Record) -> Result<()> {
        if record.nature != Nature::UserGroupAddition {
            return Err(Error::invalid_argument("expected a group addition record"));
        }
        let mut state = self.server.state.lock().expect("server mutex");
        FakeServer::store_group_record(&mut state, record)
    }

    async fn get_provisional_private_keys(
        &self,
        request: &ProvisionalKeyRequest,
        verification: Option<&Verification>,
    ) -> Result<ProvisionalKeysResponse> {
        let mut state = self.server.state.lock().expect("server mutex");
        let entry = FakeServer::provisional_entry(
            &mut state,
            request.target,
            request.hashed_value,
        );
        match verification {
            None if entry.verification_required => {
                Ok(ProvisionalKeysResponse::VerificationNeeded)
            }
            None => Ok(ProvisionalKeysResponse::Keys(entry.keys.clone())),
            Some(proof) => {
                let code = match proof {
                    Verification::Email {
                        verification_code, ..
                    }
                    | Verification::PhoneNumber {
                        verification_code, ..
                    } => verification_code.as_str(),
                    Verification::OidcIdToken { .. } => VALID_VERIFICATION_CODE,
                };
                if code == VALID_VERIFICATION_CODE {
                    Ok(ProvisionalKeysResponse::Keys(entry.keys.clone()))
                } else {
                    Err(Error::InvalidVerification {
                        message: "wrong verification code".to_string(),
                    })
                }
            }
        }
    }

    async fn claim_provisional_identity(&self, record: Record) -> Result<()> {
        if record.nature != Nature::ProvisionalIdentityClaim {
            return Err(Error::invalid_argument("expected a claim record"));
        }
        let mut state = self.server.state.lock().expect("server mutex");
        let block = FakeServer::wrap(&mut state, record);
        state.claims.push(block);
        Ok(())
    }
}
