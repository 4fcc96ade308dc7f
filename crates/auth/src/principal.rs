use storekeep_core::UserId;

use crate::{Permission, Role, authorize::permissions_for_roles};

/// A fully resolved caller for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Build a principal whose permissions are derived from its roles.
    pub fn from_roles(user_id: UserId, display_name: impl Into<String>, roles: Vec<Role>) -> Self {
        let permissions = permissions_for_roles(&roles);
        Self {
            user_id,
            display_name: display_name.into(),
            roles,
            permissions,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.as_str() == role)
    }
}
