//! `storekeep-auth`: authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: the API layer validates a bearer token
//! here, resolves the caller's permissions, and hands the inventory core an
//! already-authenticated actor.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod validator;

pub use authorize::{AuthzError, CommandAuthorization, authorize, permissions_for_roles};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
pub use validator::{Hs256JwtValidator, JwtValidator};
