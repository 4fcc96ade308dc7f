use std::collections::HashSet;

use thiserror::Error;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Operation-side authorization contract (checked before the core is called).
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal for one permission.
///
/// - No IO
/// - No panics
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal.permissions.iter().map(|p| p.as_str()).collect();

    if perms.contains(Permission::WILDCARD) || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Static role → permission policy.
///
/// `admin` grants everything. `approver` is `staff` plus the right to decide
/// on requests. Unknown roles grant nothing.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(|r| r.as_str() == Role::ADMIN) {
        return vec![Permission::new(Permission::WILDCARD)];
    }

    let mut out: Vec<&'static str> = Vec::new();
    for role in roles {
        match role.as_str() {
            Role::STAFF => out.extend(STAFF_PERMISSIONS),
            Role::APPROVER => {
                out.extend(STAFF_PERMISSIONS);
                out.push(Permission::REQUESTS_APPROVE);
            }
            _ => {}
        }
    }

    out.sort_unstable();
    out.dedup();
    out.into_iter().map(Permission::new).collect()
}

const STAFF_PERMISSIONS: [&str; 4] = [
    Permission::ITEMS_READ,
    Permission::ISSUANCES_CREATE,
    Permission::REQUESTS_CREATE,
    Permission::REQUESTS_FINALIZE,
];
