//! Durable device-local secrets.
//!
//! The keystore holds the device key pairs, the user-key chain (oldest
//! first, youngest authoritative), the encryption key pairs of claimed
//! provisional identities, and the queue of encrypted user keys waiting
//! for device-creation catch-up. It persists itself as a single
//! CBOR-serialized blob, encrypted under the user secret, through an
//! injected [`BlobStore`].

use std::collections::HashMap;
use std::sync::Arc;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use sharekit_crypto::{
    aead_decrypt, aead_encrypt, random_array, EncryptionKeyPair, PublicEncryptionKey,
    PublicSignatureKey, SignatureKeyPair, SymmetricKey, XCHACHA_IV_SIZE,
};

use crate::store::BlobStore;
use crate::types::{AppId, DeviceId, UserId};
use crate::{Error, Result};

/// Shared handle to the session's keystore.
pub type SharedKeystore = Arc<RwLock<LocalUserKeystore>>;

/// The two encryption key pairs of a claimed provisional identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionalUserKeys {
    /// App-side encryption key pair.
    pub app_encryption_key_pair: EncryptionKeyPair,
    /// Server-side encryption key pair.
    pub server_encryption_key_pair: EncryptionKeyPair,
}

/// A user key observed in a revocation record before this device
/// processed its own creation; reconciled once the device id is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUserKey {
    /// Public half of the rotated user key.
    pub public_encryption_key: PublicEncryptionKey,
    /// The private half, sealed for this device.
    pub sealed_private_key: Vec<u8>,
}

// Everything the keystore persists, in one serde-friendly struct.
#[derive(Serialize, Deserialize)]
struct KeystoreState {
    device_id: Option<DeviceId>,
    device_signature_key_pair: SignatureKeyPair,
    device_encryption_key_pair: EncryptionKeyPair,
    user_keys: Vec<EncryptionKeyPair>,
    provisional_keys: HashMap<String, ProvisionalUserKeys>,
    pending_user_keys: Vec<PendingUserKey>,
}

/// The local user's key material and its persistence.
pub struct LocalUserKeystore {
    app_id: AppId,
    user_id: UserId,
    user_secret: SymmetricKey,
    state: KeystoreState,
    store: Arc<dyn BlobStore>,
}

impl LocalUserKeystore {
    /// Opens the keystore: loads and decrypts the persisted blob, or
    /// bootstraps fresh device keys on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecryptionFailed`] if the blob does not decrypt
    /// under `user_secret` and [`Error::Internal`] on a corrupt blob.
    pub async fn open(
        app_id: AppId,
        user_id: UserId,
        user_secret: SymmetricKey,
        store: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        let state = match store.load().await? {
            Some(blob) => decrypt_state(&user_secret, &blob)?,
            None => {
                tracing::debug!(user_id = %user_id, "bootstrapping fresh device keys");
                KeystoreState {
                    device_id: None,
                    device_signature_key_pair: SignatureKeyPair::generate(),
                    device_encryption_key_pair: EncryptionKeyPair::generate(),
                    user_keys: Vec::new(),
                    provisional_keys: HashMap::new(),
                    pending_user_keys: Vec::new(),
                }
            }
        };
        let keystore = Self {
            app_id,
            user_id,
            user_secret,
            state,
            store,
        };
        keystore.persist().await?;
        Ok(keystore)
    }

    /// The application this keystore belongs to.
    #[must_use]
    pub const fn app_id(&self) -> AppId {
        self.app_id
    }

    /// The local user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// This device's id, once known.
    #[must_use]
    pub const fn device_id(&self) -> Option<DeviceId> {
        self.state.device_id
    }

    /// Records this device's id. Immutable once set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if a different id was already set.
    pub async fn set_device_id(&mut self, device_id: DeviceId) -> Result<()> {
        match self.state.device_id {
            Some(existing) if existing != device_id => {
                return Err(Error::internal("device id already set"));
            }
            _ => self.state.device_id = Some(device_id),
        }
        self.persist().await
    }

    /// The device signature key pair, set at bootstrap.
    #[must_use]
    pub const fn device_signature_key_pair(&self) -> &SignatureKeyPair {
        &self.state.device_signature_key_pair
    }

    /// The device encryption key pair, set at bootstrap.
    #[must_use]
    pub const fn device_encryption_key_pair(&self) -> &EncryptionKeyPair {
        &self.state.device_encryption_key_pair
    }

    /// All user key pairs, oldest first.
    #[must_use]
    pub fn user_keys(&self) -> &[EncryptionKeyPair] {
        &self.state.user_keys
    }

    /// The youngest user key pair, addressed by new key publishes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PreconditionFailed`] before any user key arrived.
    pub fn current_user_key(&self) -> Result<EncryptionKeyPair> {
        self.state
            .user_keys
            .last()
            .cloned()
            .ok_or_else(|| Error::precondition("no user key available yet"))
    }

    /// Finds the user key pair with the given public half, across the
    /// whole chain.
    #[must_use]
    pub fn find_user_key(
        &self,
        public_key: &PublicEncryptionKey,
    ) -> Option<EncryptionKeyPair> {
        self.state
            .user_keys
            .iter()
            .find(|pair| pair.public_key == *public_key)
            .cloned()
    }

    /// Appends a user key as the new youngest.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn add_user_key(&mut self, pair: EncryptionKeyPair) -> Result<()> {
        self.state.user_keys.push(pair);
        self.persist().await
    }

    /// Inserts a user key as the new oldest, during rotation catch-up.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn prepend_user_key(&mut self, pair: EncryptionKeyPair) -> Result<()> {
        self.state.user_keys.insert(0, pair);
        self.persist().await
    }

    /// Finds the claimed provisional key pairs addressed by the
    /// concatenated signature public keys.
    #[must_use]
    pub fn find_provisional_key(
        &self,
        app_signature_public_key: &PublicSignatureKey,
        server_signature_public_key: &PublicSignatureKey,
    ) -> Option<ProvisionalUserKeys> {
        self.state
            .provisional_keys
            .get(&provisional_key_id(
                app_signature_public_key,
                server_signature_public_key,
            ))
            .cloned()
    }

    /// Registers the key pairs of a freshly claimed provisional identity.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn add_provisional_key(
        &mut self,
        app_signature_public_key: &PublicSignatureKey,
        server_signature_public_key: &PublicSignatureKey,
        keys: ProvisionalUserKeys,
    ) -> Result<()> {
        self.state.provisional_keys.insert(
            provisional_key_id(app_signature_public_key, server_signature_public_key),
            keys,
        );
        self.persist().await
    }

    /// Queues an encrypted user key until the device id is known.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn add_pending_user_key(&mut self, pending: PendingUserKey) -> Result<()> {
        self.state.pending_user_keys.push(pending);
        self.persist().await
    }

    /// Drains the queued encrypted user keys for reconciliation.
    ///
    /// # Errors
    ///
    /// Propagates persistence failures.
    pub async fn take_pending_user_keys(&mut self) -> Result<Vec<PendingUserKey>> {
        let pending = std::mem::take(&mut self.state.pending_user_keys);
        self.persist().await?;
        Ok(pending)
    }

    async fn persist(&self) -> Result<()> {
        let mut serialized = Vec::new();
        ciborium::into_writer(&self.state, &mut serialized)
            .map_err(|err| Error::internal(format!("keystore serialization failed: {err}")))?;

        let iv = random_array::<XCHACHA_IV_SIZE>();
        let ciphertext = aead_encrypt(&self.user_secret, &iv, &serialized, b"")
            .map_err(|err| Error::internal(format!("keystore encryption failed: {err}")))?;

        let mut blob = Vec::with_capacity(XCHACHA_IV_SIZE + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);
        self.store.save(blob).await
    }
}

fn decrypt_state(user_secret: &SymmetricKey, blob: &[u8]) -> Result<KeystoreState> {
    if blob.len() < XCHACHA_IV_SIZE {
        return Err(Error::decryption("keystore blob too short"));
    }
    let (iv, ciphertext) = blob.split_at(XCHACHA_IV_SIZE);
    let serialized = aead_decrypt(
        user_secret,
        iv.try_into().expect("split at iv size"),
        ciphertext,
        b"",
    )
    .map_err(|_| Error::decryption("keystore blob authentication failed"))?;
    ciborium::from_reader(serialized.as_slice())
        .map_err(|err| Error::internal(format!("keystore deserialization failed: {err}")))
}

fn provisional_key_id(
    app_signature_public_key: &PublicSignatureKey,
    server_signature_public_key: &PublicSignatureKey,
) -> String {
    let mut concatenated = Vec::with_capacity(64);
    concatenated.extend_from_slice(app_signature_public_key.as_bytes());
    concatenated.extend_from_slice(server_signature_public_key.as_bytes());
    BASE64_STANDARD.encode(concatenated)
}
