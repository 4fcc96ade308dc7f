use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "issuances.create"). The wildcard
/// `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: &'static str = "*";
    pub const ITEMS_READ: &'static str = "items.read";
    pub const ITEMS_MANAGE: &'static str = "items.manage";
    pub const ISSUANCES_CREATE: &'static str = "issuances.create";
    pub const REQUESTS_CREATE: &'static str = "requests.create";
    pub const REQUESTS_APPROVE: &'static str = "requests.approve";
    pub const REQUESTS_FINALIZE: &'static str = "requests.finalize";
    pub const APPROVERS_MANAGE: &'static str = "approvers.manage";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == Self::WILDCARD
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
