//! Public error taxonomy of the ShareKit core.

use thiserror::Error;

use crate::types::ResourceId;

/// Result alias used throughout the core.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the ShareKit core.
///
/// Transient transport failures are reported as [`Error::Network`] and are
/// retried (if at all) by the injected client, never by the core.
/// [`Error::Internal`] marks invariant violations; it is never caught inside
/// the core.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied argument failed validation.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the argument.
        message: String,
    },

    /// An encrypted artifact does not start with a known format version.
    #[error("unhandled encrypted data format (version {version})")]
    InvalidEncryptionFormat {
        /// The version integer found at offset 0.
        version: u64,
    },

    /// Decryption failed: truncated input, authentication failure, or a
    /// missing local secret for a key-publish record.
    #[error("decryption failed: {context}")]
    DecryptionFailed {
        /// What failed.
        context: String,
        /// The affected resource, when known.
        resource_id: Option<ResourceId>,
    },

    /// No key-publish record exists for the queried resource.
    #[error("could not find key for resource: {0}")]
    ResourceNotFound(ResourceId),

    /// A group or recipient set exceeds the member limit.
    #[error("too many members: {size} exceeds the limit of {max}")]
    GroupTooBig {
        /// Members requested.
        size: usize,
        /// The enforced limit.
        max: usize,
    },

    /// The operation was invoked in the wrong session status.
    #[error("precondition failed: {message}")]
    PreconditionFailed {
        /// Which precondition was violated.
        message: String,
    },

    /// A provisional-identity verification was rejected by the server.
    #[error("invalid verification: {message}")]
    InvalidVerification {
        /// Server-provided rejection detail.
        message: String,
    },

    /// Too many failed verification attempts.
    #[error("too many verification attempts")]
    TooManyAttempts,

    /// The verification code has expired.
    #[error("expired verification code")]
    ExpiredVerification,

    /// A network call failed. Transient; not retried by the core.
    #[error("network error: {message}")]
    Network {
        /// Transport-level detail.
        message: String,
    },

    /// The session cancel token fired during the operation.
    #[error("operation canceled")]
    OperationCanceled,

    /// An invariant was violated. Always a programming error.
    #[error("internal error: {message}")]
    Internal {
        /// Which invariant broke.
        message: String,
    },
}

impl Error {
    /// Creates an [`Error::InvalidArgument`].
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an [`Error::DecryptionFailed`] without a resource id.
    pub fn decryption<S: Into<String>>(context: S) -> Self {
        Self::DecryptionFailed {
            context: context.into(),
            resource_id: None,
        }
    }

    /// Creates an [`Error::DecryptionFailed`] tagged with the affected
    /// resource.
    pub fn decryption_for<S: Into<String>>(resource_id: ResourceId, context: S) -> Self {
        Self::DecryptionFailed {
            context: context.into(),
            resource_id: Some(resource_id),
        }
    }

    /// Creates an [`Error::Internal`].
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an [`Error::Network`].
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an [`Error::PreconditionFailed`].
    pub fn precondition<S: Into<String>>(message: S) -> Self {
        Self::PreconditionFailed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_not_found_message() {
        let id = ResourceId::from_bytes([0xAB; 16]);
        let message = format!("{}", Error::ResourceNotFound(id));
        assert!(message.contains("could not find key for resource"));
        assert!(message.contains(&id.to_string()));
    }

    #[test]
    fn test_decryption_helpers() {
        let id = ResourceId::from_bytes([1; 16]);
        let err = Error::decryption_for(id, "truncated");
        match err {
            Error::DecryptionFailed {
                context,
                resource_id,
            } => {
                assert_eq!(context, "truncated");
                assert_eq!(resource_id, Some(id));
            }
            other => panic!("expected DecryptionFailed, got {other:?}"),
        }
    }
}
