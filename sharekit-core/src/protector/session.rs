//! Encryption sessions: many artifacts, one resource.
//!
//! A session publishes its content key once; everything it encrypts
//! afterwards reuses the same resource id. Recipients who can decrypt one
//! artifact from the session can decrypt them all.

use sharekit_crypto::SymmetricKey;

use crate::codec::stream::{self, EncryptionStream, DEFAULT_ENCRYPTED_CHUNK_SIZE};
use crate::codec::simple;
use crate::types::ResourceId;
use crate::Result;

use super::STREAM_THRESHOLD;

/// A live encryption session.
pub struct EncryptionSession {
    resource_id: ResourceId,
    content_key: SymmetricKey,
}

impl EncryptionSession {
    pub(super) const fn new(resource_id: ResourceId, content_key: SymmetricKey) -> Self {
        Self {
            resource_id,
            content_key,
        }
    }

    /// The resource id every artifact of this session carries.
    #[must_use]
    pub const fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Encrypts data under the session resource.
    ///
    /// Small payloads use the fixed-resource-id one-shot format; larger
    /// ones the streaming format.
    ///
    /// # Errors
    ///
    /// Propagates codec failures.
    pub fn encrypt(&self, clear: &[u8]) -> Result<Vec<u8>> {
        if clear.len() < STREAM_THRESHOLD {
            simple::encrypt_simple_with_id(&self.content_key, self.resource_id, clear)
        } else {
            stream::encrypt_buffer(
                &self.content_key,
                self.resource_id,
                DEFAULT_ENCRYPTED_CHUNK_SIZE,
                clear,
            )
        }
    }

    /// Opens a chunked encryption stream under the session resource.
    #[must_use]
    pub fn create_encryption_stream(&self) -> EncryptionStream {
        EncryptionStream::with_default_chunk_size(self.content_key.clone(), self.resource_id)
    }
}
