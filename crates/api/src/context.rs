use storekeep_auth::{Principal, Role};
use storekeep_core::UserId;

/// Authenticated caller for a request, inserted by the auth middleware.
///
/// Every mutating operation takes its actor from here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, name: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            principal: Principal::from_roles(user_id, name, roles),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn name(&self) -> &str {
        &self.principal.display_name
    }

    pub fn roles(&self) -> &[Role] {
        &self.principal.roles
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}
