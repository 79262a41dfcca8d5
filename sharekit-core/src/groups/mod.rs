//! User groups: shared-key recipients with a rotating key hierarchy.
//!
//! A group is identified by its public signature key. Its history is a
//! sequence of records: one creation, then any number of additions. Every
//! addition rotates the encryption key pair and re-seals the new private
//! key for the complete membership (old and new), so the youngest record
//! alone names the current members and the authoritative key.
//!
//! Record payloads (member entries are fixed-size, counts varint-coded):
//!
//! ```text
//! creation:  sig_pub(32) ‖ enc_pub(32) ‖ sealed_sig_priv(80)
//!            ‖ n ‖ n × member(144) ‖ m ‖ m × provisional_member(256)
//!            ‖ self_signature(64)
//! addition:  group_id(32) ‖ new_enc_pub(32) ‖ sealed_sig_priv(80)
//!            ‖ n ‖ n × member(144) ‖ m ‖ m × provisional_member(256)
//!            ‖ self_signature(64)
//! member:             user_id(32) ‖ user_enc_pub(32) ‖ sealed(80)
//! provisional_member: app_sig_pub(32) ‖ server_sig_pub(32)
//!                     ‖ app_enc_pub(32) ‖ server_enc_pub(32) ‖ sealed²(128)
//! ```
//!
//! Both self-signatures are made with the group's signature private key
//! over every preceding payload byte.

pub mod manager;
mod records;
mod replay;

pub use manager::GroupManager;
pub use records::{
    GroupMember, GroupProvisionalMember, ProvisionalMemberKeys, UserGroupAddition,
    UserGroupCreation, UserGroupRecord,
};
pub use replay::{replay_group_history, GroupKeyEntry, GroupState};

/// Maximum members per group creation or addition call.
pub const MAX_GROUP_SIZE: usize = 1000;
