//! Shared fixtures for the integration suites.

use std::sync::Arc;

use sharekit_core::identity::{
    serialize_public_identity, PublicIdentity, PublicPermanentIdentity,
};
use sharekit_core::testing::{
    FakeServer, MemoryBlobStore, MemoryGroupStore, MemoryResourceStore,
};
use sharekit_core::types::{AppId, UserId};
use sharekit_core::DataProtector;
use sharekit_crypto::{EncryptionKeyPair, SymmetricKey};

/// The application id every test session runs under.
pub const APP_ID: AppId = AppId::from_bytes([0xA0; 32]);

/// A session plus the identifiers the tests address it by.
pub struct TestUser {
    /// The user's identifier within [`APP_ID`].
    pub user_id: UserId,
    /// The user's data protector for encrypting/decrypting their data.
    pub protector: DataProtector,
}

impl TestUser {
    /// The user's public identity string.
    pub fn identity(&self) -> String {
        serialize_public_identity(&PublicIdentity::Permanent(PublicPermanentIdentity {
            app_id: APP_ID,
            user_id: self.user_id,
        }))
    }
}

/// Starts a session for a fresh user: new stores, a generated user key
/// registered with the server.
pub async fn spawn_user(server: &Arc<FakeServer>, seed: u8) -> TestUser {
    let user_id = UserId::from_bytes([seed; 32]);
    let protector = start_protector(server, user_id).await;

    let user_key = EncryptionKeyPair::generate();
    protector
        .keystore()
        .write()
        .await
        .add_user_key(user_key.clone())
        .await
        .expect("seed user key");
    server.register_user(user_id, user_key.public_key);

    TestUser { user_id, protector }
}

/// Starts a second device for an existing user: fresh stores, same user
/// key chain.
pub async fn spawn_second_device(server: &Arc<FakeServer>, user: &TestUser) -> TestUser {
    let protector = start_protector(server, user.user_id).await;

    let current_key = user
        .protector
        .keystore()
        .read()
        .await
        .current_user_key()
        .expect("first device has a user key");
    protector
        .keystore()
        .write()
        .await
        .add_user_key(current_key)
        .await
        .expect("seed user key");

    TestUser {
        user_id: user.user_id,
        protector,
    }
}

async fn start_protector(server: &Arc<FakeServer>, user_id: UserId) -> DataProtector {
    DataProtector::start(
        APP_ID,
        user_id,
        SymmetricKey::generate(),
        server.client_for(user_id),
        Arc::new(MemoryResourceStore::default()),
        Arc::new(MemoryGroupStore::default()),
        Arc::new(MemoryBlobStore::default()),
    )
    .await
    .expect("start session")
}
