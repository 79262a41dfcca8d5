//! The network collaborator interface.
//!
//! The transport — session handshake, retries, timeouts — lives outside
//! the core. The core awaits these calls at its only network suspension
//! points and treats every failure as already-final ([`crate::Error`]
//! values are surfaced unchanged, never retried here).

use async_trait::async_trait;

use sharekit_crypto::{
    EncryptionKeyPair, PublicEncryptionKey, PublicSignatureKey, SignatureKeyPair,
};

use crate::block::{Record, VerifiedBlock};
use crate::identity::ProvisionalTarget;
use crate::types::{GroupId, ResourceId, UserId};
use crate::{Result, Verification};

/// A user record as served by the user directory: the user's latest
/// public encryption key.
#[derive(Debug, Clone)]
pub struct PublicUser {
    /// The user.
    pub user_id: UserId,
    /// The user's current public user key; new key publishes address it.
    pub public_encryption_key: PublicEncryptionKey,
}

/// A lookup request for the server-side half of a provisional identity.
#[derive(Debug, Clone)]
pub struct ProvisionalKeyRequest {
    /// Which kind of out-of-band identifier.
    pub target: ProvisionalTarget,
    /// `generic_hash(value, 32)` of the email address or phone number.
    pub hashed_value: [u8; 32],
}

/// The server-held public key pair halves of a provisional identity.
#[derive(Debug, Clone)]
pub struct ServerProvisionalPublicKeys {
    /// Server-side public signature key.
    pub signature_public_key: PublicSignatureKey,
    /// Server-side public encryption key.
    pub encryption_public_key: PublicEncryptionKey,
}

/// The server-held private key pairs of a provisional identity, released
/// after (or without) verification.
#[derive(Debug, Clone)]
pub struct ServerProvisionalKeys {
    /// Server-side signature key pair.
    pub signature_key_pair: SignatureKeyPair,
    /// Server-side encryption key pair.
    pub encryption_key_pair: EncryptionKeyPair,
}

/// Outcome of asking for a provisional identity's private keys.
#[derive(Debug, Clone)]
pub enum ProvisionalKeysResponse {
    /// The server released the keys.
    Keys(ServerProvisionalKeys),
    /// The holder must prove ownership of the email/phone first.
    VerificationNeeded,
}

/// Authenticated network client, injected at construction.
#[async_trait]
pub trait Client: Send + Sync {
    /// Posts a batch of key-publish records. The batch is atomic on the
    /// server; duplicate records are no-ops.
    async fn publish_resource_keys(&self, records: Vec<Record>) -> Result<()>;

    /// Fetches the key-publish record addressed to the local user for a
    /// resource, if any exists.
    async fn fetch_resource_key(
        &self,
        resource_id: ResourceId,
    ) -> Result<Option<VerifiedBlock>>;

    /// Resolves users to their latest public user keys.
    ///
    /// Unknown users fail the whole call with
    /// [`crate::Error::InvalidArgument`].
    async fn get_public_user_keys(&self, user_ids: &[UserId]) -> Result<Vec<PublicUser>>;

    /// Resolves hashed provisional identifiers to their server-side
    /// public keys, in request order.
    async fn get_public_provisional_identities(
        &self,
        requests: &[ProvisionalKeyRequest],
    ) -> Result<Vec<ServerProvisionalPublicKeys>>;

    /// Fetches the full record history of each group, flattened in log
    /// order.
    async fn get_group_histories_by_ids(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Vec<VerifiedBlock>>;

    /// Fetches a group's record history by any of its historic public
    /// encryption keys.
    async fn get_group_histories_by_key(
        &self,
        public_encryption_key: &PublicEncryptionKey,
    ) -> Result<Vec<VerifiedBlock>>;

    /// Posts a group-creation record.
    async fn create_group(&self, record: Record) -> Result<()>;

    /// Posts a group-addition record.
    async fn patch_group(&self, record: Record) -> Result<()>;

    /// Requests a provisional identity's server-side private keys,
    /// optionally guarded by a verification proof.
    async fn get_provisional_private_keys(
        &self,
        request: &ProvisionalKeyRequest,
        verification: Option<&Verification>,
    ) -> Result<ProvisionalKeysResponse>;

    /// Posts a provisional-identity claim record.
    async fn claim_provisional_identity(&self, record: Record) -> Result<()>;
}
