//! The authenticated caller.

use serde::{Deserialize, Serialize};

use super::{Role, UserId};

/// An authenticated caller as supplied by the identity layer.
///
/// The core trusts this value; it never re-authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// The caller's user ID.
    pub id: UserId,
    /// The caller's role.
    pub role: Role,
}

impl Principal {
    /// Create a principal.
    #[must_use]
    pub const fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    /// Whether the caller is an admin.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}
