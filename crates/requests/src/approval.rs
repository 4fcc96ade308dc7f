use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storekeep_core::{ApprovalId, DomainError, DomainResult, Entity, RequestId, UserId};

/// An approver's verdict on a pending request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

impl core::str::FromStr for Decision {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::Reject),
            other => Err(DomainError::invalid_input(format!("unknown decision '{other}'"))),
        }
    }
}

/// Append-only record of one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub request_id: RequestId,
    pub approver_id: UserId,
    pub decision: Decision,
    pub comment: Option<String>,
    /// Opaque signature artifact (e.g. a data URL of a drawn signature).
    pub signature: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl Entity for Approval {
    type Id = ApprovalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A user eligible to be assigned to requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub user_id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub active: bool,
    pub registered_at: DateTime<Utc>,
}

impl Entity for Approver {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.user_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApprover {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl NewApprover {
    pub fn into_approver(self, now: DateTime<Utc>) -> DomainResult<Approver> {
        if self.name.trim().is_empty() {
            return Err(DomainError::invalid_input("approver name cannot be empty"));
        }
        Ok(Approver {
            user_id: self.user_id,
            name: self.name.trim().to_string(),
            email: self.email,
            active: true,
            registered_at: now,
        })
    }
}

/// How approvers are chosen when a request is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "ids", rename_all = "snake_case")]
pub enum ApproverSelection {
    /// Every active registered approver.
    AllCurrent,
    /// Exactly these approvers; each must be registered and active.
    Explicit(Vec<UserId>),
}

impl ApproverSelection {
    /// Resolve against the registry. Fails when nothing resolves or an
    /// explicit id is not an active approver.
    pub fn resolve(&self, registry: &[Approver]) -> DomainResult<Vec<UserId>> {
        let mut resolved: Vec<UserId> = match self {
            ApproverSelection::AllCurrent => registry
                .iter()
                .filter(|a| a.active)
                .map(|a| a.user_id)
                .collect(),
            ApproverSelection::Explicit(ids) => {
                for id in ids {
                    if !registry.iter().any(|a| a.active && a.user_id == *id) {
                        return Err(DomainError::invalid_input(format!(
                            "{id} is not an active approver"
                        )));
                    }
                }
                ids.clone()
            }
        };

        resolved.sort_unstable();
        resolved.dedup();

        if resolved.is_empty() {
            return Err(DomainError::invalid_input("no approver could be resolved"));
        }
        Ok(resolved)
    }
}
