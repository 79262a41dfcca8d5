//! Core identifier types.
//!
//! All identifiers are fixed-size byte arrays with hex Debug output. They
//! carry no secret material and may be logged freely.

use serde::{Deserialize, Serialize};
use std::fmt;

use sharekit_crypto::generic_hash16;
use sharekit_crypto::SymmetricKey;

/// Size of a resource identifier in bytes.
pub const RESOURCE_ID_SIZE: usize = 16;

/// A 16-byte resource identifier.
///
/// Stable for the lifetime of an encrypted artifact and extractable from
/// the artifact without the content key. Streaming resources derive it from
/// the content key; one-shot formats use the authentication tag (v1-v3) or
/// a caller-supplied id (v5).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub [u8; RESOURCE_ID_SIZE]);

impl ResourceId {
    /// Creates a resource id from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; RESOURCE_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a resource id from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if the slice is not 16
    /// bytes.
    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        let arr: [u8; RESOURCE_ID_SIZE] = bytes.try_into().map_err(|_| {
            crate::Error::invalid_argument(format!(
                "resource id must be {RESOURCE_ID_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Derives the resource id of a streaming resource from its content
    /// key.
    #[must_use]
    pub fn derive_from_key(key: &SymmetricKey) -> Self {
        Self(generic_hash16(key.as_bytes()))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; RESOURCE_ID_SIZE] {
        &self.0
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", hex::encode(self.0))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for ResourceId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

macro_rules! id32 {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Creates an identifier from raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Creates an identifier from a slice.
            ///
            /// # Errors
            ///
            /// Returns [`crate::Error::InvalidArgument`] if the slice is
            /// not 32 bytes.
            pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
                let arr: [u8; 32] = bytes.try_into().map_err(|_| {
                    crate::Error::invalid_argument(format!(
                        concat!(stringify!($name), " must be 32 bytes, got {}"),
                        bytes.len()
                    ))
                })?;
                Ok(Self(arr))
            }

            /// Returns the raw bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

id32! {
    /// A 32-byte user identifier.
    UserId
}

id32! {
    /// A 32-byte application (tenant log) identifier.
    AppId
}

id32! {
    /// A 32-byte group identifier: the group's public signature key.
    GroupId
}

id32! {
    /// A 32-byte device identifier.
    DeviceId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_from_slice() {
        let id = ResourceId::from_slice(&[3u8; 16]).unwrap();
        assert_eq!(id.as_bytes(), &[3u8; 16]);
        assert!(ResourceId::from_slice(&[3u8; 15]).is_err());
    }

    #[test]
    fn test_derive_from_key_is_deterministic() {
        let key = SymmetricKey::from_bytes([9u8; 32]);
        assert_eq!(
            ResourceId::derive_from_key(&key),
            ResourceId::derive_from_key(&key)
        );
    }

    #[test]
    fn test_display_is_hex() {
        let id = UserId::from_bytes([0xFF; 32]);
        assert!(id.to_string().starts_with("ffff"));
    }
}
