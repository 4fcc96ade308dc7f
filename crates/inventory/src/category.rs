use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storekeep_core::{CategoryId, DomainError, DomainResult, Entity};

/// Item grouping. Names are unique (case-insensitive, enforced by the store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewCategory {
    pub fn into_category(self, id: CategoryId, now: DateTime<Utc>) -> DomainResult<Category> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::invalid_input("category name cannot be empty"));
        }
        Ok(Category {
            id,
            name: name.to_string(),
            description: self.description,
            created_at: now,
        })
    }
}

impl Category {
    /// Key used for the uniqueness check.
    pub fn name_key(&self) -> String {
        self.name.to_lowercase()
    }
}
