use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storekeep_core::{DomainError, DomainResult, Entity, IssuanceId, ItemId, UserId, ensure_bounded};

/// A direct, unapproved withdrawal of stock ("items out"). Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceRecord {
    pub id: IssuanceId,
    pub person_name: String,
    pub item_id: ItemId,
    pub quantity: i64,
    pub issued_by: UserId,
    pub issued_at: DateTime<Utc>,
}

impl Entity for IssuanceRecord {
    type Id = IssuanceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for an issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStock {
    pub person_name: String,
    pub item_id: ItemId,
    pub quantity: i64,
}

impl IssueStock {
    /// Shape checks only; stock availability is checked under the row lock.
    pub fn validate(&self) -> DomainResult<()> {
        if self.person_name.trim().is_empty() {
            return Err(DomainError::invalid_input("person_name cannot be empty"));
        }
        if self.quantity <= 0 {
            return Err(DomainError::invalid_input("quantity must be greater than zero"));
        }
        ensure_bounded("quantity", self.quantity)
    }

    pub fn into_record(self, id: IssuanceId, issued_by: UserId, now: DateTime<Utc>) -> IssuanceRecord {
        IssuanceRecord {
            id,
            person_name: self.person_name.trim().to_string(),
            item_id: self.item_id,
            quantity: self.quantity,
            issued_by,
            issued_at: now,
        }
    }
}
