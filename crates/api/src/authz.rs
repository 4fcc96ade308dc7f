//! API-side authorization guard.
//!
//! Permissions are checked at the operation boundary, before any engine is
//! called, so infra and the domain crates stay auth-agnostic.

use axum::http::StatusCode;
use axum::response::Response;

use storekeep_auth::{AuthzError, CommandAuthorization, Permission, authorize};

use crate::app::errors;
use crate::context::PrincipalContext;

/// The permissions one HTTP operation needs.
pub struct Required(Vec<Permission>);

impl Required {
    pub fn one(permission: &'static str) -> Self {
        Self(vec![Permission::new(permission)])
    }
}

impl CommandAuthorization for Required {
    fn required_permissions(&self) -> &[Permission] {
        &self.0
    }
}

/// Check every permission `op` requires against the caller.
pub fn authorize_operation<C: CommandAuthorization>(
    principal: &PrincipalContext,
    op: &C,
) -> Result<(), AuthzError> {
    for perm in op.required_permissions() {
        authorize(principal.principal(), perm)?;
    }
    Ok(())
}

/// Shorthand for handlers: 403 JSON response when `permission` is missing.
pub fn require(principal: &PrincipalContext, permission: &'static str) -> Result<(), Response> {
    authorize_operation(principal, &Required::one(permission)).map_err(|e| {
        tracing::debug!(user_id = %principal.user_id(), error = %e, "authorization denied");
        errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string())
    })
}
