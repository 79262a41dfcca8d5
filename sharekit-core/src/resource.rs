//! Resource creation and content-key resolution.

use std::sync::Arc;

use sharekit_crypto::SymmetricKey;

use crate::client::Client;
use crate::codec::{extract_resource_id, simple};
use crate::publish::decryptor::KeyDecryptor;
use crate::publish::KeyPublishRecord;
use crate::store::ResourceStore;
use crate::types::ResourceId;
use crate::{Error, Result};

/// A freshly created one-shot resource.
#[derive(Debug, Clone)]
pub struct Resource {
    /// The resource's identifier.
    pub resource_id: ResourceId,
    /// The symmetric key its payload is encrypted under.
    pub content_key: SymmetricKey,
    /// The sealed payload; absent for streaming resources.
    pub encrypted_bytes: Option<Vec<u8>>,
}

/// Locates content keys: local store first, then a server fetch handed to
/// the key decryptor, with a write-through save on success.
pub struct ResourceManager {
    client: Arc<dyn Client>,
    store: Arc<dyn ResourceStore>,
    decryptor: KeyDecryptor,
}

impl ResourceManager {
    /// Creates a manager over the injected collaborators.
    #[must_use]
    pub const fn new(
        client: Arc<dyn Client>,
        store: Arc<dyn ResourceStore>,
        decryptor: KeyDecryptor,
    ) -> Self {
        Self {
            client,
            store,
            decryptor,
        }
    }

    /// Resolves a resource id to its content key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] when no key-publish exists for
    /// the resource and [`Error::DecryptionFailed`] when one exists but
    /// the local user cannot open it.
    pub async fn find_key(&self, resource_id: ResourceId) -> Result<SymmetricKey> {
        if let Some(key) = self.store.find_key(resource_id).await? {
            return Ok(key);
        }

        tracing::debug!(resource_id = %resource_id, "content key not local, fetching");
        let block = self
            .client
            .fetch_resource_key(resource_id)
            .await?
            .ok_or(Error::ResourceNotFound(resource_id))?;
        let record = KeyPublishRecord::deserialize(block.nature, &block.payload)?;
        if record.resource_id() != resource_id {
            return Err(Error::internal(
                "key publish does not match the requested resource",
            ));
        }

        let content_key = self.decryptor.decrypt(&record).await?;
        self.store.save_key(resource_id, content_key.clone()).await?;
        Ok(content_key)
    }

    /// Resolves a resource id against the local store only, without a
    /// server fetch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] when the key is not local.
    pub async fn find_local_key(&self, resource_id: ResourceId) -> Result<SymmetricKey> {
        self.store
            .find_key(resource_id)
            .await?
            .ok_or(Error::ResourceNotFound(resource_id))
    }

    /// Persists a resolved content key.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn save_key(
        &self,
        resource_id: ResourceId,
        content_key: SymmetricKey,
    ) -> Result<()> {
        self.store.save_key(resource_id, content_key).await
    }

    /// Creates a one-shot resource: fresh key, sealed payload, id taken
    /// from the sealed artifact.
    ///
    /// # Errors
    ///
    /// Propagates codec failures.
    pub fn make_simple_resource(clear: &[u8]) -> Result<Resource> {
        let content_key = SymmetricKey::generate();
        let encrypted_bytes = simple::encrypt_simple(&content_key, clear)?;
        let resource_id = extract_resource_id(&encrypted_bytes)?;
        Ok(Resource {
            resource_id,
            content_key,
            encrypted_bytes: Some(encrypted_bytes),
        })
    }

    /// Creates a streaming resource: fresh key, id derived from the key.
    #[must_use]
    pub fn make_stream_resource() -> Resource {
        let content_key = SymmetricKey::generate();
        let resource_id = ResourceId::derive_from_key(&content_key);
        Resource {
            resource_id,
            content_key,
            encrypted_bytes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharekit_crypto::generic_hash16;

    #[test]
    fn test_simple_resource_id_matches_artifact() {
        let resource = ResourceManager::make_simple_resource(b"clear data").unwrap();
        let encrypted = resource.encrypted_bytes.unwrap();
        assert_eq!(
            extract_resource_id(&encrypted).unwrap(),
            resource.resource_id
        );
        assert_eq!(
            simple::decrypt_simple(&resource.content_key, &encrypted).unwrap(),
            b"clear data"
        );
    }

    #[test]
    fn test_stream_resource_id_is_key_hash() {
        let resource = ResourceManager::make_stream_resource();
        assert!(resource.encrypted_bytes.is_none());
        assert_eq!(
            resource.resource_id.as_bytes(),
            &generic_hash16(resource.content_key.as_bytes())
        );
    }
}
