//! Decryption stream with automatic content-key resolution.

use std::sync::Arc;

use crate::codec::stream::DecryptionStream;
use crate::resource::ResourceManager;
use crate::types::ResourceId;
use crate::{Error, Result};

/// A [`DecryptionStream`] that resolves its content key through the
/// resource manager as soon as the stream header arrives.
pub struct StreamDecryptor {
    inner: DecryptionStream,
    resources: Arc<ResourceManager>,
    started: bool,
}

impl StreamDecryptor {
    pub(super) fn new(resources: Arc<ResourceManager>) -> Self {
        Self {
            inner: DecryptionStream::new(),
            resources,
            started: false,
        }
    }

    /// The stream's resource id, once the header arrived.
    #[must_use]
    pub fn resource_id(&self) -> Option<ResourceId> {
        self.inner.header().map(|header| header.resource_id)
    }

    /// Feeds encrypted bytes; resolves the content key on the first call
    /// that completes the header.
    ///
    /// # Errors
    ///
    /// Propagates key-resolution and chunk-decryption failures; after an
    /// error the stream stays failed.
    pub async fn push(&mut self, encrypted: &[u8]) -> Result<()> {
        self.inner.push(encrypted)?;
        if !self.started {
            if let Some(header) = self.inner.header() {
                let key = self.resources.find_key(header.resource_id).await?;
                self.inner.start(key)?;
                self.started = true;
            }
        }
        Ok(())
    }

    /// Returns the next decrypted clear slab, if one is ready.
    pub fn pop_clear(&mut self) -> Option<Vec<u8>> {
        self.inner.pop_clear()
    }

    /// Terminates the stream and returns the remaining clear bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecryptionFailed`] on a truncated stream.
    pub fn finish(self) -> Result<Vec<u8>> {
        if !self.started {
            return Err(Error::decryption("truncated"));
        }
        self.inner.finish()
    }
}
