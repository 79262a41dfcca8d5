//! Recipient selection for encrypt and share calls.

/// Who receives the content key of an encrypted resource.
///
/// Recipients are typed public identities; raw user ids and the legacy
/// single-list shape are rejected at parse time. `share_with_self`
/// defaults to on so the encrypting user can always decrypt their own
/// data.
#[derive(Debug, Clone)]
pub struct SharingOptions {
    /// Public identity strings: permanent users and provisional
    /// (email/phone) identities.
    pub share_with_users: Vec<String>,
    /// Base64-encoded group ids.
    pub share_with_groups: Vec<String>,
    /// Whether to publish the key to the local user as well.
    pub share_with_self: bool,
}

impl Default for SharingOptions {
    fn default() -> Self {
        Self {
            share_with_users: Vec::new(),
            share_with_groups: Vec::new(),
            share_with_self: true,
        }
    }
}

impl SharingOptions {
    /// Options sharing only with the local user.
    #[must_use]
    pub fn only_self() -> Self {
        Self::default()
    }

    /// Adds user recipients.
    #[must_use]
    pub fn with_users<I, S>(mut self, identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.share_with_users
            .extend(identities.into_iter().map(Into::into));
        self
    }

    /// Adds group recipients.
    #[must_use]
    pub fn with_groups<I, S>(mut self, group_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.share_with_groups
            .extend(group_ids.into_iter().map(Into::into));
        self
    }

    /// Disables the implicit share with the local user.
    #[must_use]
    pub const fn without_self(mut self) -> Self {
        self.share_with_self = false;
        self
    }
}
