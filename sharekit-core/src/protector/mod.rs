//! The data-protection façade.
//!
//! [`DataProtector`] is the entry point of the core: it encrypts clear
//! data into self-describing artifacts, decrypts them for authorized
//! recipients, and fans content keys out to users, groups, and
//! provisional identities. One-shot and streaming codecs are selected by
//! clear-data length; sharing always goes through the same fanout.

mod options;
mod session;
mod streams;

pub use options::SharingOptions;
pub use session::EncryptionSession;
pub use streams::StreamDecryptor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use tokio::sync::RwLock;

use sharekit_crypto::SymmetricKey;

use crate::cancel::{cancel_pair, CancelHandle, CancelToken};
use crate::client::Client;
use crate::codec::stream::{self, EncryptionStream, DEFAULT_ENCRYPTED_CHUNK_SIZE};
use crate::codec::{detect_format, extract_resource_id, simple};
use crate::groups::{GroupManager, MAX_GROUP_SIZE};
use crate::identity::{partition_identities, PublicPermanentIdentity};
use crate::keystore::{LocalUserKeystore, SharedKeystore};
use crate::provisional::ProvisionalManager;
use crate::publish::decryptor::KeyDecryptor;
use crate::publish::{
    make_group_key_publish, make_provisional_key_publish, make_user_key_publish,
};
use crate::resource::ResourceManager;
use crate::store::{BlobStore, GroupStore, ResourceStore};
use crate::types::{AppId, GroupId, ResourceId, UserId};
use crate::{Error, Result};

/// Clear-data length at which encryption switches to the streaming
/// format.
pub const STREAM_THRESHOLD: usize = 1024 * 1024;

/// The public façade of the encryption core.
pub struct DataProtector {
    client: Arc<dyn Client>,
    resources: Arc<ResourceManager>,
    groups: Arc<GroupManager>,
    provisional: Arc<ProvisionalManager>,
    keystore: SharedKeystore,
    cancel_handle: CancelHandle,
    cancel: CancelToken,
    stopped: AtomicBool,
}

impl DataProtector {
    /// Opens the keystore and wires the managers over the injected
    /// collaborators.
    ///
    /// # Errors
    ///
    /// Propagates keystore open failures.
    pub async fn start(
        app_id: AppId,
        user_id: UserId,
        user_secret: SymmetricKey,
        client: Arc<dyn Client>,
        resource_store: Arc<dyn ResourceStore>,
        group_store: Arc<dyn GroupStore>,
        blob_store: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        let keystore: SharedKeystore = Arc::new(RwLock::new(
            LocalUserKeystore::open(app_id, user_id, user_secret, blob_store).await?,
        ));
        let provisional = Arc::new(ProvisionalManager::new(client.clone(), keystore.clone()));
        let groups = Arc::new(GroupManager::new(
            client.clone(),
            group_store,
            keystore.clone(),
            provisional.clone(),
        ));
        let decryptor = KeyDecryptor::new(keystore.clone(), groups.clone());
        let resources = Arc::new(ResourceManager::new(
            client.clone(),
            resource_store,
            decryptor,
        ));
        let (cancel_handle, cancel) = cancel_pair();
        Ok(Self {
            client,
            resources,
            groups,
            provisional,
            keystore,
            cancel_handle,
            cancel,
            stopped: AtomicBool::new(false),
        })
    }

    /// Stops the session: pending and future operations fail with
    /// [`Error::OperationCanceled`] or [`Error::PreconditionFailed`].
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cancel_handle.cancel();
    }

    /// The session keystore, for key-chain bootstrap and catch-up.
    #[must_use]
    pub fn keystore(&self) -> SharedKeystore {
        self.keystore.clone()
    }

    /// The group manager.
    #[must_use]
    pub const fn group_manager(&self) -> &Arc<GroupManager> {
        &self.groups
    }

    /// The provisional-identity manager.
    #[must_use]
    pub const fn provisional_manager(&self) -> &Arc<ProvisionalManager> {
        &self.provisional
    }

    /// The resource manager.
    #[must_use]
    pub const fn resource_manager(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    /// Encrypts `clear` and publishes its content key to the selected
    /// recipients.
    ///
    /// Payloads under [`STREAM_THRESHOLD`] bytes use the one-shot codec;
    /// larger ones the chunked streaming codec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] on malformed recipients,
    /// [`Error::GroupTooBig`] on an oversized recipient set, and
    /// [`Error::PreconditionFailed`] after [`Self::stop`].
    pub async fn encrypt(&self, clear: &[u8], options: &SharingOptions) -> Result<Vec<u8>> {
        self.ensure_ready()?;
        if clear.len() < STREAM_THRESHOLD {
            let resource = ResourceManager::make_simple_resource(clear)?;
            self.share_resources(
                &[(resource.resource_id, resource.content_key)],
                options,
            )
            .await?;
            Ok(resource
                .encrypted_bytes
                .expect("one-shot resources carry their bytes"))
        } else {
            let resource = ResourceManager::make_stream_resource();
            self.share_resources(
                &[(resource.resource_id, resource.content_key.clone())],
                options,
            )
            .await?;
            stream::encrypt_buffer(
                &resource.content_key,
                resource.resource_id,
                DEFAULT_ENCRYPTED_CHUNK_SIZE,
                clear,
            )
        }
    }

    /// Decrypts an artifact of any supported format, resolving its
    /// content key locally or from the server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEncryptionFormat`],
    /// [`Error::ResourceNotFound`], or [`Error::DecryptionFailed`]
    /// depending on what fails.
    pub async fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>> {
        self.ensure_ready()?;
        let format = detect_format(encrypted)?;
        let resource_id = extract_resource_id(encrypted)?;
        let content_key = self.resources.find_key(resource_id).await?;
        if format.is_simple() {
            simple::decrypt_simple(&content_key, encrypted)
        } else {
            stream::decrypt_buffer(&content_key, encrypted)
        }
    }

    /// Publishes already-known content keys to more recipients.
    ///
    /// Never re-encrypts payloads; the keys must be in the local resource
    /// store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceNotFound`] for a resource whose key is
    /// not local.
    pub async fn share(
        &self,
        resource_ids: &[ResourceId],
        options: &SharingOptions,
    ) -> Result<()> {
        self.ensure_ready()?;
        if resource_ids.is_empty() {
            return Ok(());
        }
        let mut keys = Vec::with_capacity(resource_ids.len());
        for resource_id in resource_ids {
            keys.push((
                *resource_id,
                self.resources.find_local_key(*resource_id).await?,
            ));
        }
        self.share_resources(&keys, options).await
    }

    /// Creates an encryption session: one resource, one key publish, many
    /// artifacts.
    ///
    /// # Errors
    ///
    /// Propagates sharing-fanout failures.
    pub async fn create_encryption_session(
        &self,
        options: &SharingOptions,
    ) -> Result<EncryptionSession> {
        self.ensure_ready()?;
        let resource = ResourceManager::make_stream_resource();
        self.share_resources(
            &[(resource.resource_id, resource.content_key.clone())],
            options,
        )
        .await?;
        Ok(EncryptionSession::new(
            resource.resource_id,
            resource.content_key,
        ))
    }

    /// Creates a chunked encryption stream whose key is published before
    /// the first chunk exists.
    ///
    /// # Errors
    ///
    /// Propagates sharing-fanout failures.
    pub async fn create_encryption_stream(
        &self,
        options: &SharingOptions,
    ) -> Result<EncryptionStream> {
        self.ensure_ready()?;
        let resource = ResourceManager::make_stream_resource();
        self.share_resources(
            &[(resource.resource_id, resource.content_key.clone())],
            options,
        )
        .await?;
        Ok(EncryptionStream::with_default_chunk_size(
            resource.content_key,
            resource.resource_id,
        ))
    }

    /// Creates a decryption stream that resolves its content key from
    /// the first chunk header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PreconditionFailed`] after [`Self::stop`].
    pub fn create_decryption_stream(&self) -> Result<StreamDecryptor> {
        self.ensure_ready()?;
        Ok(StreamDecryptor::new(self.resources.clone()))
    }

    // The sharing fanout. Ordering matters: the local key save for
    // share-with-self completes before the network publish is issued, so
    // a canceled publish never strands an undecryptable artifact.
    async fn share_resources(
        &self,
        resources: &[(ResourceId, SymmetricKey)],
        options: &SharingOptions,
    ) -> Result<()> {
        let (app_id, user_id) = {
            let keystore = self.keystore.read().await;
            (keystore.app_id(), keystore.user_id())
        };

        let (mut permanent, provisional) = partition_identities(&options.share_with_users)?;
        let group_ids = parse_group_ids(&options.share_with_groups)?;

        for identity_app_id in permanent
            .iter()
            .map(|identity| identity.app_id)
            .chain(provisional.iter().map(|identity| identity.app_id))
        {
            if identity_app_id != app_id {
                return Err(Error::invalid_argument(
                    "recipient identity belongs to another application",
                ));
            }
        }

        let recipient_count = permanent.len() + provisional.len() + group_ids.len();
        if recipient_count > MAX_GROUP_SIZE {
            return Err(Error::GroupTooBig {
                size: recipient_count,
                max: MAX_GROUP_SIZE,
            });
        }
        if recipient_count == 0 && !options.share_with_self {
            return Err(Error::invalid_argument(
                "no recipients and share-with-self disabled",
            ));
        }

        if options.share_with_self
            && !permanent.iter().any(|identity| identity.user_id == user_id)
        {
            permanent.push(PublicPermanentIdentity { app_id, user_id });
        }

        let users = if permanent.is_empty() {
            Vec::new()
        } else {
            let user_ids: Vec<UserId> =
                permanent.iter().map(|identity| identity.user_id).collect();
            self.cancel
                .run(self.client.get_public_user_keys(&user_ids))
                .await?
        };
        let provisional_users = if provisional.is_empty() {
            Vec::new()
        } else {
            self.cancel
                .run(self.provisional.get_provisional_users(&provisional))
                .await?
        };
        let group_keys = if group_ids.is_empty() {
            Vec::new()
        } else {
            self.cancel
                .run(self.groups.get_groups_public_encryption_keys(&group_ids))
                .await?
        };

        if options.share_with_self {
            for (resource_id, content_key) in resources {
                self.resources
                    .save_key(*resource_id, content_key.clone())
                    .await?;
            }
        }

        let mut records =
            Vec::with_capacity(resources.len() * (users.len() + provisional_users.len() + group_keys.len()));
        for (resource_id, content_key) in resources {
            for group_key in &group_keys {
                records.push(
                    make_group_key_publish(*group_key, content_key, *resource_id)?
                        .serialize(),
                );
            }
            for provisional_user in &provisional_users {
                records.push(
                    make_provisional_key_publish(
                        provisional_user.app_signature_public_key,
                        provisional_user.server_signature_public_key,
                        &provisional_user.app_encryption_public_key,
                        &provisional_user.server_encryption_public_key,
                        content_key,
                        *resource_id,
                    )?
                    .serialize(),
                );
            }
            for user in &users {
                records.push(
                    make_user_key_publish(
                        user.public_encryption_key,
                        content_key,
                        *resource_id,
                    )?
                    .serialize(),
                );
            }
        }

        tracing::debug!(
            resources = resources.len(),
            records = records.len(),
            "publishing resource keys"
        );
        self.cancel
            .run(self.client.publish_resource_keys(records))
            .await
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::precondition("session is stopped"));
        }
        Ok(())
    }
}

fn parse_group_ids(encoded: &[String]) -> Result<Vec<GroupId>> {
    let mut seen = std::collections::HashSet::new();
    let mut group_ids = Vec::new();
    for value in encoded {
        let bytes = BASE64_STANDARD
            .decode(value)
            .map_err(|_| Error::invalid_argument(format!("invalid group id: {value}")))?;
        let group_id = GroupId::from_slice(&bytes)
            .map_err(|_| Error::invalid_argument(format!("invalid group id: {value}")))?;
        if seen.insert(group_id) {
            group_ids.push(group_id);
        }
    }
    Ok(group_ids)
}
