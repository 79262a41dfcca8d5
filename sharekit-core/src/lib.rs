//! End-to-end encryption core for the ShareKit data-sharing SDK.
//!
//! The core turns clear data into self-describing sealed artifacts,
//! decrypts them for authorized recipients, and brokers per-resource
//! content keys between users, device families, and groups through a
//! signed append-only log of control records. Large payloads stream
//! chunk by chunk with authenticated encryption and tamper-evident
//! termination.
//!
//! The entry point is [`DataProtector`]. Network transport, persistent
//! stores, and the keystore blob slot are injected behind the traits in
//! [`client`] and [`store`]; [`testing`] ships in-memory implementations.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sharekit_core::testing::{FakeServer, MemoryBlobStore, MemoryGroupStore, MemoryResourceStore};
//! use sharekit_core::types::{AppId, UserId};
//! use sharekit_core::{DataProtector, SharingOptions};
//! use sharekit_crypto::SymmetricKey;
//!
//! # async fn example() -> sharekit_core::Result<()> {
//! let server = FakeServer::new();
//! let user_id = UserId::from_bytes([1; 32]);
//! let protector = DataProtector::start(
//!     AppId::from_bytes([0; 32]),
//!     user_id,
//!     SymmetricKey::generate(),
//!     server.client_for(user_id),
//!     Arc::new(MemoryResourceStore::default()),
//!     Arc::new(MemoryGroupStore::default()),
//!     Arc::new(MemoryBlobStore::default()),
//! )
//! .await?;
//!
//! let encrypted = protector.encrypt(b"secret", &SharingOptions::default()).await?;
//! let clear = protector.decrypt(&encrypted).await?;
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod cancel;
pub mod client;
pub mod codec;
pub mod error;
pub mod groups;
pub mod identity;
pub mod keystore;
pub mod protector;
pub mod provisional;
pub mod publish;
pub mod resource;
pub mod store;
pub mod testing;
pub mod types;

pub use error::{Error, Result};
pub use protector::{DataProtector, EncryptionSession, SharingOptions, StreamDecryptor};
pub use provisional::{AttachResult, Verification, VerificationMethod};
