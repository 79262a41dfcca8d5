//! Provisional identities: share with an email address or phone number
//! before its owner has an account.
//!
//! A provisional identity is two key pairs split between the application
//! (embedded in the identity string) and the server (released after the
//! holder proves ownership of the identifier). Claiming merges both
//! halves into the local user's keystore and posts a claim record so
//! other devices can catch up.

use std::sync::Arc;

use tokio::sync::Mutex;

use sharekit_crypto::{
    seal, sign, EncryptionKeyPair, PrivateEncryptionKey, PublicEncryptionKey,
    PublicSignatureKey, Signature, SEAL_OVERHEAD, SIGNATURE_SIZE,
};

use crate::block::{Nature, Record};
use crate::client::{Client, ProvisionalKeyRequest, ProvisionalKeysResponse, ServerProvisionalKeys};
use crate::identity::{ProvisionalTarget, PublicProvisionalIdentity, SecretProvisionalIdentity};
use crate::keystore::{ProvisionalUserKeys, SharedKeystore};
use crate::types::{AppId, UserId};
use crate::{Error, Result};

/// A provisional identity with both public key pairs resolved, ready to
/// be a sharing or group-member recipient.
#[derive(Debug, Clone)]
pub struct PublicProvisionalUser {
    /// The application this identity belongs to.
    pub app_id: AppId,
    /// Which kind of out-of-band identifier.
    pub target: ProvisionalTarget,
    /// The email address or phone number.
    pub value: String,
    /// App-side public signature key.
    pub app_signature_public_key: PublicSignatureKey,
    /// App-side public encryption key.
    pub app_encryption_public_key: PublicEncryptionKey,
    /// Server-side public signature key.
    pub server_signature_public_key: PublicSignatureKey,
    /// Server-side public encryption key.
    pub server_encryption_public_key: PublicEncryptionKey,
}

/// Proof of ownership of a provisional identifier.
#[derive(Debug, Clone)]
pub enum Verification {
    /// A code received by email.
    Email {
        /// The verified address.
        email: String,
        /// The code from the verification email.
        verification_code: String,
    },
    /// A code received by SMS.
    PhoneNumber {
        /// The verified number.
        phone_number: String,
        /// The code from the verification SMS.
        verification_code: String,
    },
    /// An OpenID Connect id token whose subject the server checks.
    OidcIdToken {
        /// The raw id token.
        id_token: String,
    },
}

/// How a pending provisional identity can be verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationMethod {
    /// A code will be emailed to this address.
    Email {
        /// The address on the identity.
        email: String,
    },
    /// A code will be texted to this number.
    PhoneNumber {
        /// The number on the identity.
        phone_number: String,
    },
}

/// Outcome of [`ProvisionalManager::attach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachResult {
    /// The identity is claimed; its keys are in the keystore.
    Ready,
    /// The holder must verify ownership, then call
    /// [`ProvisionalManager::verify`].
    IdentityVerificationNeeded {
        /// The verification channel to use.
        method: VerificationMethod,
    },
}

const SEALED_PRIVATE_KEYS_SIZE: usize = 64 + SEAL_OVERHEAD;
const CLAIM_PAYLOAD_SIZE: usize =
    32 + 32 + 32 + SIGNATURE_SIZE + SIGNATURE_SIZE + 32 + SEALED_PRIVATE_KEYS_SIZE;

/// The record transferring a claimed provisional identity to a user.
///
/// Payload layout:
///
/// ```text
/// user_id(32) ‖ app_sig_pub(32) ‖ server_sig_pub(32)
/// ‖ author_signature_by_app_key(64) ‖ author_signature_by_server_key(64)
/// ‖ recipient_user_pub(32) ‖ sealed_private_encryption_keys(112)
/// ```
///
/// Both author signatures cover `app_sig_pub ‖ server_sig_pub ‖ user_id`
/// and prove the claimer held both signature keys. The sealed field is
/// `seal(app_enc_priv ‖ server_enc_priv, recipient_user_pub)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalIdentityClaim {
    /// The claiming user.
    pub user_id: UserId,
    /// App-side public signature key of the claimed identity.
    pub app_signature_public_key: PublicSignatureKey,
    /// Server-side public signature key of the claimed identity.
    pub server_signature_public_key: PublicSignatureKey,
    /// Proof of possession of the app-side signature key.
    pub author_signature_by_app_key: Signature,
    /// Proof of possession of the server-side signature key.
    pub author_signature_by_server_key: Signature,
    /// The user key the private halves are sealed under.
    pub recipient_user_public_key: PublicEncryptionKey,
    /// The two private encryption keys, sealed for the user.
    pub sealed_private_encryption_keys: Vec<u8>,
}

impl ProvisionalIdentityClaim {
    /// Builds a claim record from both halves of a provisional identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if sealing fails.
    pub fn new(
        user_id: UserId,
        identity: &SecretProvisionalIdentity,
        server_keys: &ServerProvisionalKeys,
        recipient_user_public_key: PublicEncryptionKey,
    ) -> Result<Self> {
        let app_signature_public_key = identity.app_signature_key_pair.public_key;
        let server_signature_public_key = server_keys.signature_key_pair.public_key;

        let signed = signed_claim_data(
            &app_signature_public_key,
            &server_signature_public_key,
            user_id,
        );

        let mut private_keys = Vec::with_capacity(64);
        private_keys
            .extend_from_slice(identity.app_encryption_key_pair.private_key.as_bytes());
        private_keys
            .extend_from_slice(server_keys.encryption_key_pair.private_key.as_bytes());
        let sealed_private_encryption_keys =
            seal(&private_keys, &recipient_user_public_key).map_err(|err| {
                Error::internal(format!("sealing provisional keys failed: {err}"))
            })?;

        Ok(Self {
            user_id,
            app_signature_public_key,
            server_signature_public_key,
            author_signature_by_app_key: sign(
                &signed,
                &identity.app_signature_key_pair.private_key,
            ),
            author_signature_by_server_key: sign(
                &signed,
                &server_keys.signature_key_pair.private_key,
            ),
            recipient_user_public_key,
            sealed_private_encryption_keys,
        })
    }

    /// Serializes the claim into a postable [`Record`].
    #[must_use]
    pub fn serialize(&self) -> Record {
        let mut payload = Vec::with_capacity(CLAIM_PAYLOAD_SIZE);
        payload.extend_from_slice(self.user_id.as_bytes());
        payload.extend_from_slice(self.app_signature_public_key.as_bytes());
        payload.extend_from_slice(self.server_signature_public_key.as_bytes());
        payload.extend_from_slice(self.author_signature_by_app_key.as_bytes());
        payload.extend_from_slice(self.author_signature_by_server_key.as_bytes());
        payload.extend_from_slice(self.recipient_user_public_key.as_bytes());
        payload.extend_from_slice(&self.sealed_private_encryption_keys);
        Record {
            nature: Nature::ProvisionalIdentityClaim,
            payload,
        }
    }

    /// Parses a claim payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] on a malformed payload.
    pub fn deserialize(payload: &[u8]) -> Result<Self> {
        if payload.len() != CLAIM_PAYLOAD_SIZE {
            return Err(Error::internal("malformed provisional identity claim"));
        }
        let map_err = |err: sharekit_crypto::CryptoError| Error::internal(err.to_string());
        Ok(Self {
            user_id: UserId::from_slice(&payload[..32])?,
            app_signature_public_key: PublicSignatureKey::from_slice(&payload[32..64])
                .map_err(map_err)?,
            server_signature_public_key: PublicSignatureKey::from_slice(&payload[64..96])
                .map_err(map_err)?,
            author_signature_by_app_key: Signature::from_slice(&payload[96..160])
                .map_err(map_err)?,
            author_signature_by_server_key: Signature::from_slice(&payload[160..224])
                .map_err(map_err)?,
            recipient_user_public_key: PublicEncryptionKey::from_slice(&payload[224..256])
                .map_err(map_err)?,
            sealed_private_encryption_keys: payload[256..].to_vec(),
        })
    }

    /// Unseals both private encryption keys with the recipient user key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecryptionFailed`] if the blob does not unseal
    /// under `user_key_pair`.
    pub fn open_private_keys(
        &self,
        user_key_pair: &EncryptionKeyPair,
    ) -> Result<ProvisionalUserKeys> {
        let opened =
            sharekit_crypto::seal_open(&self.sealed_private_encryption_keys, user_key_pair)
                .map_err(|_| Error::decryption("provisional claim does not unseal"))?;
        if opened.len() != 64 {
            return Err(Error::internal("provisional claim has the wrong key length"));
        }
        let app_private = PrivateEncryptionKey::from_slice(&opened[..32])
            .map_err(|err| Error::internal(err.to_string()))?;
        let server_private = PrivateEncryptionKey::from_slice(&opened[32..])
            .map_err(|err| Error::internal(err.to_string()))?;
        Ok(ProvisionalUserKeys {
            app_encryption_key_pair: EncryptionKeyPair::from_private_key(app_private),
            server_encryption_key_pair: EncryptionKeyPair::from_private_key(server_private),
        })
    }
}

fn signed_claim_data(
    app_signature_public_key: &PublicSignatureKey,
    server_signature_public_key: &PublicSignatureKey,
    user_id: UserId,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(96);
    out.extend_from_slice(app_signature_public_key.as_bytes());
    out.extend_from_slice(server_signature_public_key.as_bytes());
    out.extend_from_slice(user_id.as_bytes());
    out
}

/// Mediates provisional-identity lookup, claim, and verification.
pub struct ProvisionalManager {
    client: Arc<dyn Client>,
    keystore: SharedKeystore,
    pending: Mutex<Option<SecretProvisionalIdentity>>,
}

impl ProvisionalManager {
    /// Creates a manager over the injected collaborators.
    #[must_use]
    pub fn new(client: Arc<dyn Client>, keystore: SharedKeystore) -> Self {
        Self {
            client,
            keystore,
            pending: Mutex::new(None),
        }
    }

    /// Resolves provisional identities to their full public key sets, in
    /// input order.
    ///
    /// # Errors
    ///
    /// Propagates network failures.
    pub async fn get_provisional_users(
        &self,
        identities: &[PublicProvisionalIdentity],
    ) -> Result<Vec<PublicProvisionalUser>> {
        if identities.is_empty() {
            return Ok(Vec::new());
        }
        let requests: Vec<ProvisionalKeyRequest> = identities
            .iter()
            .map(|identity| ProvisionalKeyRequest {
                target: identity.target,
                hashed_value: identity.hashed_value(),
            })
            .collect();
        let server_keys = self
            .client
            .get_public_provisional_identities(&requests)
            .await?;
        if server_keys.len() != identities.len() {
            return Err(Error::internal(
                "provisional identity lookup returned the wrong count",
            ));
        }
        Ok(identities
            .iter()
            .zip(server_keys)
            .map(|(identity, server)| PublicProvisionalUser {
                app_id: identity.app_id,
                target: identity.target,
                value: identity.value.clone(),
                app_signature_public_key: identity.app_signature_public_key,
                app_encryption_public_key: identity.app_encryption_public_key,
                server_signature_public_key: server.signature_public_key,
                server_encryption_public_key: server.encryption_public_key,
            })
            .collect())
    }

    /// Attaches a provisional identity to the local user.
    ///
    /// Attempts a silent claim; when the server demands proof of
    /// ownership, the identity is parked until [`Self::verify`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the identity belongs to
    /// another application, plus any network failure.
    pub async fn attach(&self, identity: &SecretProvisionalIdentity) -> Result<AttachResult> {
        {
            let keystore = self.keystore.read().await;
            if identity.app_id != keystore.app_id() {
                return Err(Error::invalid_argument(
                    "provisional identity belongs to another application",
                ));
            }
        }

        let public_user = self
            .get_provisional_users(std::slice::from_ref(&identity.public_identity()))
            .await?
            .remove(0);

        {
            let keystore = self.keystore.read().await;
            if keystore
                .find_provisional_key(
                    &public_user.app_signature_public_key,
                    &public_user.server_signature_public_key,
                )
                .is_some()
            {
                return Ok(AttachResult::Ready);
            }
        }

        let request = ProvisionalKeyRequest {
            target: identity.target,
            hashed_value: identity.hashed_value(),
        };
        match self
            .client
            .get_provisional_private_keys(&request, None)
            .await?
        {
            ProvisionalKeysResponse::Keys(server_keys) => {
                self.claim(identity, server_keys).await?;
                Ok(AttachResult::Ready)
            }
            ProvisionalKeysResponse::VerificationNeeded => {
                let method = match identity.target {
                    ProvisionalTarget::Email => VerificationMethod::Email {
                        email: identity.value.clone(),
                    },
                    ProvisionalTarget::PhoneNumber => VerificationMethod::PhoneNumber {
                        phone_number: identity.value.clone(),
                    },
                };
                *self.pending.lock().await = Some(identity.clone());
                Ok(AttachResult::IdentityVerificationNeeded { method })
            }
        }
    }

    /// Completes a pending attach with a verification proof.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PreconditionFailed`] without a pending identity,
    /// [`Error::InvalidArgument`] when the proof targets a different
    /// identifier, and the server's verdict otherwise
    /// ([`Error::InvalidVerification`], [`Error::TooManyAttempts`],
    /// [`Error::ExpiredVerification`]).
    pub async fn verify(&self, verification: &Verification) -> Result<()> {
        let identity = {
            let pending = self.pending.lock().await;
            pending
                .clone()
                .ok_or_else(|| Error::precondition("no provisional identity awaiting verification"))?
        };

        check_verification_matches(&identity, verification)?;

        let request = ProvisionalKeyRequest {
            target: identity.target,
            hashed_value: identity.hashed_value(),
        };
        let server_keys = match self
            .client
            .get_provisional_private_keys(&request, Some(verification))
            .await?
        {
            ProvisionalKeysResponse::Keys(keys) => keys,
            ProvisionalKeysResponse::VerificationNeeded => {
                return Err(Error::InvalidVerification {
                    message: "server rejected the verification proof".to_string(),
                })
            }
        };

        self.claim(&identity, server_keys).await?;
        *self.pending.lock().await = None;
        Ok(())
    }

    // Builds and posts the claim record, then registers both encryption
    // key pairs locally.
    async fn claim(
        &self,
        identity: &SecretProvisionalIdentity,
        server_keys: ServerProvisionalKeys,
    ) -> Result<()> {
        let (user_id, recipient_key) = {
            let keystore = self.keystore.read().await;
            (keystore.user_id(), keystore.current_user_key()?.public_key)
        };

        let claim =
            ProvisionalIdentityClaim::new(user_id, identity, &server_keys, recipient_key)?;
        self.client
            .claim_provisional_identity(claim.serialize())
            .await?;

        tracing::debug!(target_value = %identity.value, "claimed provisional identity");

        let mut keystore = self.keystore.write().await;
        keystore
            .add_provisional_key(
                &identity.app_signature_key_pair.public_key,
                &server_keys.signature_key_pair.public_key,
                ProvisionalUserKeys {
                    app_encryption_key_pair: identity.app_encryption_key_pair.clone(),
                    server_encryption_key_pair: server_keys.encryption_key_pair,
                },
            )
            .await
    }
}

fn check_verification_matches(
    identity: &SecretProvisionalIdentity,
    verification: &Verification,
) -> Result<()> {
    let matches = match (identity.target, verification) {
        (ProvisionalTarget::Email, Verification::Email { email, .. }) => {
            *email == identity.value
        }
        (ProvisionalTarget::PhoneNumber, Verification::PhoneNumber { phone_number, .. }) => {
            *phone_number == identity.value
        }
        // OIDC subjects are checked server-side against the identifier.
        (_, Verification::OidcIdToken { .. }) => true,
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(Error::invalid_argument(
            "verification does not match the pending provisional identity",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharekit_crypto::SignatureKeyPair;

    fn identity() -> SecretProvisionalIdentity {
        SecretProvisionalIdentity::generate(
            AppId::from_bytes([1; 32]),
            ProvisionalTarget::Email,
            "bob@example.com",
        )
    }

    fn server_keys() -> ServerProvisionalKeys {
        ServerProvisionalKeys {
            signature_key_pair: SignatureKeyPair::generate(),
            encryption_key_pair: EncryptionKeyPair::generate(),
        }
    }

    #[test]
    fn test_claim_roundtrip_and_unseal() {
        let identity = identity();
        let server = server_keys();
        let user_keys = EncryptionKeyPair::generate();
        let user_id = UserId::from_bytes([5; 32]);

        let claim =
            ProvisionalIdentityClaim::new(user_id, &identity, &server, user_keys.public_key)
                .unwrap();
        let record = claim.serialize();
        assert_eq!(record.nature, Nature::ProvisionalIdentityClaim);
        assert_eq!(record.payload.len(), CLAIM_PAYLOAD_SIZE);

        let parsed = ProvisionalIdentityClaim::deserialize(&record.payload).unwrap();
        assert_eq!(parsed, claim);

        let opened = parsed.open_private_keys(&user_keys).unwrap();
        assert_eq!(
            opened.app_encryption_key_pair.public_key,
            identity.app_encryption_key_pair.public_key
        );
        assert_eq!(
            opened.server_encryption_key_pair.public_key,
            server.encryption_key_pair.public_key
        );
    }

    #[test]
    fn test_claim_author_signatures_verify() {
        let identity = identity();
        let server = server_keys();
        let claim = ProvisionalIdentityClaim::new(
            UserId::from_bytes([5; 32]),
            &identity,
            &server,
            EncryptionKeyPair::generate().public_key,
        )
        .unwrap();

        let signed = signed_claim_data(
            &claim.app_signature_public_key,
            &claim.server_signature_public_key,
            claim.user_id,
        );
        sharekit_crypto::verify(
            &signed,
            &claim.author_signature_by_app_key,
            &claim.app_signature_public_key,
        )
        .unwrap();
        sharekit_crypto::verify(
            &signed,
            &claim.author_signature_by_server_key,
            &claim.server_signature_public_key,
        )
        .unwrap();
    }

    #[test]
    fn test_malformed_claim_rejected() {
        assert!(matches!(
            ProvisionalIdentityClaim::deserialize(&[0u8; CLAIM_PAYLOAD_SIZE - 1]),
            Err(Error::Internal { .. })
        ));
    }

    #[test]
    fn test_verification_cross_check() {
        let identity = identity();
        assert!(check_verification_matches(
            &identity,
            &Verification::Email {
                email: "bob@example.com".to_string(),
                verification_code: "12345678".to_string(),
            },
        )
        .is_ok());
        assert!(check_verification_matches(
            &identity,
            &Verification::Email {
                email: "eve@example.com".to_string(),
                verification_code: "12345678".to_string(),
            },
        )
        .is_err());
        assert!(check_verification_matches(
            &identity,
            &Verification::PhoneNumber {
                phone_number: "+33600000000".to_string(),
                verification_code: "12345678".to_string(),
            },
        )
        .is_err());
        assert!(check_verification_matches(
            &identity,
            &Verification::OidcIdToken {
                id_token: "jwt".to_string(),
            },
        )
        .is_ok());
    }
}
