//! Persistent-store collaborator interfaces.
//!
//! The core reads and writes through these traits and never assumes a
//! schema. Implementations decide durability; the in-memory versions in
//! [`crate::testing`] are enough for tests.

use async_trait::async_trait;

use sharekit_crypto::{EncryptionKeyPair, PrivateEncryptionKey, PublicEncryptionKey, SymmetricKey};

use crate::types::{GroupId, ResourceId};
use crate::Result;

/// Write-through cache of resolved content keys.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Persists a resolved `(resource id, content key)` pair. Idempotent.
    async fn save_key(&self, resource_id: ResourceId, key: SymmetricKey) -> Result<()>;

    /// Looks up a previously saved content key.
    async fn find_key(&self, resource_id: ResourceId) -> Result<Option<SymmetricKey>>;
}

/// A group's last known keys, as derived from its record history.
#[derive(Debug, Clone)]
pub struct GroupKeyRecord {
    /// The group.
    pub group_id: GroupId,
    /// The group's current public encryption key.
    pub public_encryption_key: PublicEncryptionKey,
    /// The matching private key, present only when the local user is a
    /// member.
    pub private_encryption_key: Option<PrivateEncryptionKey>,
}

/// Cache of group keys derived from history replays.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Persists derived group keys, ordered oldest to youngest. Every
    /// generation is kept for historic key publishes; the youngest entry
    /// of a group defines its current public key.
    async fn save_group_encryption_keys(&self, records: &[GroupKeyRecord]) -> Result<()>;

    /// Looks up the full key pair for a group public key. Only groups the
    /// local user belongs to have one.
    async fn find_group_encryption_key_pair(
        &self,
        public_encryption_key: &PublicEncryptionKey,
    ) -> Result<Option<EncryptionKeyPair>>;

    /// Looks up last known public encryption keys for the given groups.
    /// Unknown groups are simply absent from the result.
    async fn find_groups_public_keys(
        &self,
        group_ids: &[GroupId],
    ) -> Result<Vec<(GroupId, PublicEncryptionKey)>>;
}

/// Storage slot for the keystore's single encrypted blob.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Reads the blob, if one was saved.
    async fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Atomically replaces the blob.
    async fn save(&self, blob: Vec<u8>) -> Result<()>;
}
