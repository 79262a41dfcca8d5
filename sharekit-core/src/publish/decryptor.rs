//! Unsealing content keys from key-publish records.

use std::sync::Arc;

use sharekit_crypto::{seal_open, SymmetricKey};

use super::KeyPublishRecord;
use crate::groups::GroupManager;
use crate::keystore::SharedKeystore;
use crate::{Error, Result};

/// Dispatches a key-publish record to the local secret that can open it.
pub struct KeyDecryptor {
    keystore: SharedKeystore,
    groups: Arc<GroupManager>,
}

impl KeyDecryptor {
    /// Creates a decryptor over the local user's keys and groups.
    #[must_use]
    pub const fn new(keystore: SharedKeystore, groups: Arc<GroupManager>) -> Self {
        Self { keystore, groups }
    }

    /// Recovers the content key from a key-publish record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecryptionFailed`] when the local user holds no
    /// matching secret (unknown user key, non-member group, unclaimed
    /// provisional identity) or the sealed data fails to open.
    pub async fn decrypt(&self, record: &KeyPublishRecord) -> Result<SymmetricKey> {
        let resource_id = record.resource_id();
        match record {
            KeyPublishRecord::ToUser {
                recipient,
                sealed_key,
                ..
            } => {
                let user_key = {
                    let keystore = self.keystore.read().await;
                    keystore.find_user_key(recipient)
                }
                .ok_or_else(|| Error::decryption_for(resource_id, "User key not found"))?;
                let opened = seal_open(sealed_key, &user_key).map_err(|_| {
                    Error::decryption_for(resource_id, "key publish does not unseal")
                })?;
                SymmetricKey::from_slice(&opened)
                    .map_err(|err| Error::internal(err.to_string()))
            }
            KeyPublishRecord::ToGroup {
                recipient,
                sealed_key,
                ..
            } => {
                let group_keys = self
                    .groups
                    .get_group_encryption_key_pair(recipient)
                    .await
                    .map_err(|err| match err {
                        Error::InvalidArgument { .. } => {
                            Error::decryption_for(resource_id, "Group not found")
                        }
                        other => other,
                    })?;
                let opened = seal_open(sealed_key, &group_keys).map_err(|_| {
                    Error::decryption_for(resource_id, "key publish does not unseal")
                })?;
                SymmetricKey::from_slice(&opened)
                    .map_err(|err| Error::internal(err.to_string()))
            }
            KeyPublishRecord::ToProvisional {
                app_signature_public_key,
                server_signature_public_key,
                sealed_key,
                ..
            } => {
                let provisional_keys = {
                    let keystore = self.keystore.read().await;
                    keystore.find_provisional_key(
                        app_signature_public_key,
                        server_signature_public_key,
                    )
                }
                .ok_or_else(|| {
                    Error::decryption_for(resource_id, "Provisional user key not found")
                })?;
                let inner =
                    seal_open(sealed_key, &provisional_keys.server_encryption_key_pair)
                        .map_err(|_| {
                            Error::decryption_for(
                                resource_id,
                                "key publish does not unseal",
                            )
                        })?;
                let opened = seal_open(&inner, &provisional_keys.app_encryption_key_pair)
                    .map_err(|_| {
                        Error::decryption_for(resource_id, "key publish does not unseal")
                    })?;
                SymmetricKey::from_slice(&opened)
                    .map_err(|err| Error::internal(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::RwLock;

    use crate::groups::GroupManager;
    use crate::keystore::LocalUserKeystore;
    use crate::provisional::ProvisionalManager;
    use crate::publish::{make_provisional_key_publish, make_user_key_publish};
    use crate::testing::{FakeServer, MemoryBlobStore, MemoryGroupStore};
    use crate::types::{AppId, ResourceId, UserId};
    use sharekit_crypto::{EncryptionKeyPair, SignatureKeyPair};

    async fn decryptor_for(user_key: Option<EncryptionKeyPair>) -> KeyDecryptor {
        let user_id = UserId::from_bytes([1; 32]);
        let mut keystore = LocalUserKeystore::open(
            AppId::from_bytes([0; 32]),
            user_id,
            SymmetricKey::generate(),
            Arc::new(MemoryBlobStore::default()),
        )
        .await
        .unwrap();
        if let Some(pair) = user_key {
            keystore.add_user_key(pair).await.unwrap();
        }
        let keystore: crate::keystore::SharedKeystore = Arc::new(RwLock::new(keystore));

        let server = FakeServer::new();
        let client = server.client_for(user_id);
        let provisional =
            Arc::new(ProvisionalManager::new(client.clone(), keystore.clone()));
        let groups = Arc::new(GroupManager::new(
            client,
            Arc::new(MemoryGroupStore::default()),
            keystore.clone(),
            provisional,
        ));
        KeyDecryptor::new(keystore, groups)
    }

    #[tokio::test]
    async fn test_recipient_recovers_published_key() {
        let user_key = EncryptionKeyPair::generate();
        let decryptor = decryptor_for(Some(user_key.clone())).await;

        let content_key = SymmetricKey::generate();
        let record = make_user_key_publish(
            user_key.public_key,
            &content_key,
            ResourceId::from_bytes([4; 16]),
        )
        .unwrap();

        assert_eq!(decryptor.decrypt(&record).await.unwrap(), content_key);
    }

    #[tokio::test]
    async fn test_non_recipient_gets_user_key_not_found() {
        let decryptor = decryptor_for(Some(EncryptionKeyPair::generate())).await;

        // Published to a different user key.
        let record = make_user_key_publish(
            EncryptionKeyPair::generate().public_key,
            &SymmetricKey::generate(),
            ResourceId::from_bytes([4; 16]),
        )
        .unwrap();

        match decryptor.decrypt(&record).await {
            Err(Error::DecryptionFailed { context, .. }) => {
                assert_eq!(context, "User key not found");
            }
            other => panic!("expected a decryption failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unclaimed_provisional_gets_key_not_found() {
        let decryptor = decryptor_for(None).await;

        let record = make_provisional_key_publish(
            SignatureKeyPair::generate().public_key,
            SignatureKeyPair::generate().public_key,
            &EncryptionKeyPair::generate().public_key,
            &EncryptionKeyPair::generate().public_key,
            &SymmetricKey::generate(),
            ResourceId::from_bytes([4; 16]),
        )
        .unwrap();

        match decryptor.decrypt(&record).await {
            Err(Error::DecryptionFailed { context, .. }) => {
                assert_eq!(context, "Provisional user key not found");
            }
            other => panic!("expected a decryption failure, got {other:?}"),
        }
    }
}
