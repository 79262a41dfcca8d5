//! Control-record envelope types.
//!
//! Every record posted to the application log carries a `nature` tag that
//! selects its payload parser. Authorship and signature verification happen
//! in an external layer; the core consumes [`VerifiedBlock`]s it can trust
//! and produces bare [`Record`]s for the transport to wrap.

use sharekit_crypto::Signature;

use crate::{Error, Result};

/// Record kind tags, as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Nature {
    /// A content key sealed for a user.
    KeyPublishToUser = 8,
    /// Establishes a group: initial keys and member list.
    UserGroupCreation = 10,
    /// A content key sealed for a group.
    KeyPublishToUserGroup = 11,
    /// Rotates a group's encryption key and membership.
    UserGroupAddition = 12,
    /// A content key double-sealed for a provisional user.
    KeyPublishToProvisionalUser = 13,
    /// Transfers a claimed provisional identity's keys to a user.
    ProvisionalIdentityClaim = 14,
}

impl Nature {
    /// Maps a wire tag to its nature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] for tags the core does not handle.
    pub fn from_wire(value: u8) -> Result<Self> {
        match value {
            8 => Ok(Self::KeyPublishToUser),
            10 => Ok(Self::UserGroupCreation),
            11 => Ok(Self::KeyPublishToUserGroup),
            12 => Ok(Self::UserGroupAddition),
            13 => Ok(Self::KeyPublishToProvisionalUser),
            14 => Ok(Self::ProvisionalIdentityClaim),
            _ => Err(Error::internal(format!("unhandled record nature {value}"))),
        }
    }

    /// The wire tag of this nature.
    #[must_use]
    pub const fn wire(self) -> u8 {
        self as u8
    }
}

/// A record authored by the local user, not yet wrapped in an envelope.
#[derive(Debug, Clone)]
pub struct Record {
    /// The record kind tag.
    pub nature: Nature,
    /// The serialized record payload.
    pub payload: Vec<u8>,
}

/// A record whose envelope the verification layer has already checked.
#[derive(Debug, Clone)]
pub struct VerifiedBlock {
    /// The record kind tag.
    pub nature: u8,
    /// The serialized record payload.
    pub payload: Vec<u8>,
    /// Hash of the authoring device's creation block.
    pub author: [u8; 32],
    /// The author's signature over the envelope.
    pub signature: Signature,
    /// Position in the application log.
    pub index: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nature_wire_roundtrip() {
        for nature in [
            Nature::KeyPublishToUser,
            Nature::UserGroupCreation,
            Nature::KeyPublishToUserGroup,
            Nature::UserGroupAddition,
            Nature::KeyPublishToProvisionalUser,
            Nature::ProvisionalIdentityClaim,
        ] {
            assert_eq!(Nature::from_wire(nature.wire()).unwrap(), nature);
        }
    }

    #[test]
    fn test_unknown_nature_is_internal_error() {
        assert!(matches!(Nature::from_wire(9), Err(Error::Internal { .. })));
        assert!(matches!(Nature::from_wire(0), Err(Error::Internal { .. })));
    }
}
