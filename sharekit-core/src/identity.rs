//! Public and secret identity strings.
//!
//! Identities travel between applications as opaque strings:
//! base64-encoded JSON with a `target` discriminator. A permanent identity
//! names a registered user; a provisional identity carries the app-side
//! key pair bound to an email address or phone number until its holder
//! claims it.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::{Deserialize, Serialize};

use sharekit_crypto::{
    generic_hash, EncryptionKeyPair, PublicEncryptionKey, PublicSignatureKey,
    SignatureKeyPair,
};

use crate::types::{AppId, UserId};
use crate::{Error, Result};

/// The out-of-band channel a provisional identity is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionalTarget {
    /// An email address.
    Email,
    /// A phone number in E.164 form.
    PhoneNumber,
}

/// A registered user's public identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicPermanentIdentity {
    /// The application this identity belongs to.
    pub app_id: AppId,
    /// The user.
    pub user_id: UserId,
}

/// The public form of a provisional identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicProvisionalIdentity {
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
}

impl PublicProvisionalIdentity {
    /// Hashes the identifier value for server-side lookups.
    #[must_use]
    pub fn hashed_value(&self) -> [u8; 32] {
        hash_provisional_value(&self.value)
    }
}

/// Any public identity accepted by the sharing APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicIdentity {
    /// A registered user.
    Permanent(PublicPermanentIdentity),
    /// An unclaimed email/phone identity.
    Provisional(PublicProvisionalIdentity),
}

/// The secret form of a provisional identity, held by its creator until
/// the claim completes.
#[derive(Clone)]
pub struct SecretProvisionalIdentity {
    /// The application this identity belongs to.
    pub app_id: AppId,
    /// Which kind of out-of-band identifier.
    pub target: ProvisionalTarget,
    /// The email address or phone number.
    pub value: String,
    /// App-side signature key pair.
    pub app_signature_key_pair: SignatureKeyPair,
    /// App-side encryption key pair.
    pub app_encryption_key_pair: EncryptionKeyPair,
}

impl SecretProvisionalIdentity {
    /// Creates a fresh provisional identity for an identifier.
    #[must_use]
    pub fn generate(app_id: AppId, target: ProvisionalTarget, value: &str) -> Self {
        Self {
            app_id,
            target,
            value: value.to_string(),
            app_signature_key_pair: SignatureKeyPair::generate(),
            app_encryption_key_pair: EncryptionKeyPair::generate(),
        }
    }

    /// The public form of this identity.
    #[must_use]
    pub fn public_identity(&self) -> PublicProvisionalIdentity {
        PublicProvisionalIdentity {
            app_id: self.app_id,
            target: self.target,
            value: self.value.clone(),
            app_signature_public_key: self.app_signature_key_pair.public_key,
            app_encryption_public_key: self.app_encryption_key_pair.public_key,
        }
    }

    /// Hashes the identifier value for server-side lookups.
    #[must_use]
    pub fn hashed_value(&self) -> [u8; 32] {
        hash_provisional_value(&self.value)
    }
}

impl std::fmt::Debug for SecretProvisionalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretProvisionalIdentity")
            .field("target", &self.target)
            .field("value", &self.value)
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

/// Parses a list of identity strings and partitions them into permanent
/// and provisional recipients.
///
/// Duplicate strings are collapsed; order is otherwise preserved.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] on the first malformed identity.
pub fn partition_identities(
    identities: &[String],
) -> Result<(Vec<PublicPermanentIdentity>, Vec<PublicProvisionalIdentity>)> {
    let mut seen = std::collections::HashSet::new();
    let mut permanent = Vec::new();
    let mut provisional = Vec::new();
    for identity in identities {
        if !seen.insert(identity.as_str()) {
            continue;
        }
        match parse_public_identity(identity)? {
            PublicIdentity::Permanent(parsed) => permanent.push(parsed),
            PublicIdentity::Provisional(parsed) => provisional.push(parsed),
        }
    }
    Ok((permanent, provisional))
}

/// Hashes an email address or phone number for provisional lookups.
#[must_use]
pub fn hash_provisional_value(value: &str) -> [u8; 32] {
    let digest = generic_hash(value.as_bytes(), 32);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

// Wire shape of every identity string: base64(JSON) with a `target`
// discriminator. Fields absent for the given target must stay absent.
#[derive(Serialize, Deserialize)]
struct RawIdentity {
    app_id: String,
    target: String,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_signature_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_encryption_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    private_signature_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    private_encryption_key: Option<String>,
}

fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>> {
    BASE64_STANDARD
        .decode(value)
        .map_err(|_| Error::invalid_argument(format!("invalid base64 in identity field {field}")))
}

fn parse_raw(identity: &str) -> Result<RawIdentity> {
    let json = decode_b64("identity", identity)?;
    serde_json::from_slice(&json)
        .map_err(|_| Error::invalid_argument("malformed identity string"))
}

fn encode_raw(raw: &RawIdentity) -> String {
    let json = serde_json::to_vec(raw).expect("identity serialization is infallible");
    BASE64_STANDARD.encode(json)
}

fn parse_target(target: &str) -> Result<ProvisionalTarget> {
    match target {
        "email" => Ok(ProvisionalTarget::Email),
        "phone_number" => Ok(ProvisionalTarget::PhoneNumber),
        other => Err(Error::invalid_argument(format!(
            "unsupported provisional identity target: {other}"
        ))),
    }
}

const fn target_name(target: ProvisionalTarget) -> &'static str {
    match target {
        ProvisionalTarget::Email => "email",
        ProvisionalTarget::PhoneNumber => "phone_number",
    }
}

/// Parses a public identity string.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] on malformed base64 or JSON, an
/// unsupported target, or missing key fields.
pub fn parse_public_identity(identity: &str) -> Result<PublicIdentity> {
    let raw = parse_raw(identity)?;
    let app_id = AppId::from_slice(&decode_b64("app_id", &raw.app_id)?)?;

    if raw.target == "user" {
        let user_id = UserId::from_slice(&decode_b64("value", &raw.value)?)?;
        return Ok(PublicIdentity::Permanent(PublicPermanentIdentity {
            app_id,
            user_id,
        }));
    }

    let target = parse_target(&raw.target)?;
    let signature_key = raw.public_signature_key.ok_or_else(|| {
        Error::invalid_argument("provisional identity lacks a public signature key")
    })?;
    let encryption_key = raw.public_encryption_key.ok_or_else(|| {
        Error::invalid_argument("provisional identity lacks a public encryption key")
    })?;
    Ok(PublicIdentity::Provisional(PublicProvisionalIdentity {
        app_id,
        target,
        value: raw.value,
        app_signature_public_key: PublicSignatureKey::from_slice(&decode_b64(
            "public_signature_key",
            &signature_key,
        )?)
        .map_err(|_| Error::invalid_argument("bad public signature key length"))?,
        app_encryption_public_key: PublicEncryptionKey::from_slice(&decode_b64(
            "public_encryption_key",
            &encryption_key,
        )?)
        .map_err(|_| Error::invalid_argument("bad public encryption key length"))?,
    }))
}

/// Serializes a public identity to its string form.
#[must_use]
pub fn serialize_public_identity(identity: &PublicIdentity) -> String {
    let raw = match identity {
        PublicIdentity::Permanent(permanent) => RawIdentity {
            app_id: BASE64_STANDARD.encode(permanent.app_id.as_bytes()),
            target: "user".to_string(),
            value: BASE64_STANDARD.encode(permanent.user_id.as_bytes()),
            public_signature_key: None,
            public_encryption_key: None,
            private_signature_key: None,
            private_encryption_key: None,
        },
        PublicIdentity::Provisional(provisional) => RawIdentity {
            app_id: BASE64_STANDARD.encode(provisional.app_id.as_bytes()),
            target: target_name(provisional.target).to_string(),
            value: provisional.value.clone(),
            public_signature_key: Some(
                BASE64_STANDARD.encode(provisional.app_signature_public_key.as_bytes()),
            ),
            public_encryption_key: Some(
                BASE64_STANDARD.encode(provisional.app_encryption_public_key.as_bytes()),
            ),
            private_signature_key: None,
            private_encryption_key: None,
        },
    };
    encode_raw(&raw)
}

/// Parses a secret provisional identity string.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] on malformed input or missing
/// private key fields.
pub fn parse_secret_provisional_identity(
    identity: &str,
) -> Result<SecretProvisionalIdentity> {
    let raw = parse_raw(identity)?;
    let app_id = AppId::from_slice(&decode_b64("app_id", &raw.app_id)?)?;
    let target = parse_target(&raw.target)?;

    let signature_seed = raw.private_signature_key.ok_or_else(|| {
        Error::invalid_argument("secret provisional identity lacks a private signature key")
    })?;
    let encryption_secret = raw.private_encryption_key.ok_or_else(|| {
        Error::invalid_argument("secret provisional identity lacks a private encryption key")
    })?;

    let signature_seed = decode_b64("private_signature_key", &signature_seed)?;
    let encryption_secret = decode_b64("private_encryption_key", &encryption_secret)?;
    let signature_seed: [u8; 32] = signature_seed
        .try_into()
        .map_err(|_| Error::invalid_argument("bad private signature key length"))?;
    let encryption_secret: [u8; 32] = encryption_secret
        .try_into()
        .map_err(|_| Error::invalid_argument("bad private encryption key length"))?;

    Ok(SecretProvisionalIdentity {
        app_id,
        target,
        value: raw.value,
        app_signature_key_pair: SignatureKeyPair::from_private_key(
            sharekit_crypto::PrivateSignatureKey::from_bytes(signature_seed),
        ),
        app_encryption_key_pair: EncryptionKeyPair::from_private_key(
            sharekit_crypto::PrivateEncryptionKey::from_bytes(encryption_secret),
        ),
    })
}

/// Serializes a secret provisional identity to its string form.
#[must_use]
pub fn serialize_secret_provisional_identity(
    identity: &SecretProvisionalIdentity,
) -> String {
    encode_raw(&RawIdentity {
        app_id: BASE64_STANDARD.encode(identity.app_id.as_bytes()),
        target: target_name(identity.target).to_string(),
        value: identity.value.clone(),
        public_signature_key: Some(
            BASE64_STANDARD.encode(identity.app_signature_key_pair.public_key.as_bytes()),
        ),
        public_encryption_key: Some(
            BASE64_STANDARD.encode(identity.app_encryption_key_pair.public_key.as_bytes()),
        ),
        private_signature_key: Some(
            BASE64_STANDARD.encode(identity.app_signature_key_pair.private_key.as_bytes()),
        ),
        private_encryption_key: Some(
            BASE64_STANDARD.encode(identity.app_encryption_key_pair.private_key.as_bytes()),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_id() -> AppId {
        AppId::from_bytes([0x11; 32])
    }

    #[test]
    fn test_permanent_identity_roundtrip() {
        let identity = PublicIdentity::Permanent(PublicPermanentIdentity {
            app_id: app_id(),
            user_id: UserId::from_bytes([0x22; 32]),
        });
        let encoded = serialize_public_identity(&identity);
        assert_eq!(parse_public_identity(&encoded).unwrap(), identity);
    }

    #[test]
    fn test_provisional_identity_roundtrip() {
        let secret =
            SecretProvisionalIdentity::generate(app_id(), ProvisionalTarget::Email, "bob@example.com");
        let encoded = serialize_public_identity(&PublicIdentity::Provisional(
            secret.public_identity(),
        ));
        match parse_public_identity(&encoded).unwrap() {
            PublicIdentity::Provisional(parsed) => {
                assert_eq!(parsed, secret.public_identity());
            }
            PublicIdentity::Permanent(_) => panic!("expected a provisional identity"),
        }
    }

    #[test]
    fn test_secret_provisional_identity_roundtrip() {
        let secret = SecretProvisionalIdentity::generate(
            app_id(),
            ProvisionalTarget::PhoneNumber,
            "+33600000000",
        );
        let encoded = serialize_secret_provisional_identity(&secret);
        let parsed = parse_secret_provisional_identity(&encoded).unwrap();
        assert_eq!(parsed.value, secret.value);
        assert_eq!(
            parsed.app_signature_key_pair.public_key,
            secret.app_signature_key_pair.public_key
        );
        assert_eq!(
            parsed.app_encryption_key_pair.public_key,
            secret.app_encryption_key_pair.public_key
        );
    }

    #[test]
    fn test_malformed_identity_rejected() {
        assert!(matches!(
            parse_public_identity("not base64!!"),
            Err(Error::InvalidArgument { .. })
        ));
        let garbage = BASE64_STANDARD.encode(b"{\"target\": 7}");
        assert!(matches!(
            parse_public_identity(&garbage),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_unknown_target_rejected() {
        let raw = RawIdentity {
            app_id: BASE64_STANDARD.encode([0u8; 32]),
            target: "carrier_pigeon".to_string(),
            value: "coop 7".to_string(),
            public_signature_key: Some(BASE64_STANDARD.encode([0u8; 32])),
            public_encryption_key: Some(BASE64_STANDARD.encode([0u8; 32])),
            private_signature_key: None,
            private_encryption_key: None,
        };
        assert!(matches!(
            parse_public_identity(&encode_raw(&raw)),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_hashed_value_is_stable() {
        assert_eq!(
            hash_provisional_value("bob@example.com"),
            hash_provisional_value("bob@example.com")
        );
        assert_ne!(
            hash_provisional_value("bob@example.com"),
            hash_provisional_value("alice@example.com")
        );
    }
}
