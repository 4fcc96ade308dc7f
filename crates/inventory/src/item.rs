use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storekeep_core::{CategoryId, DomainError, DomainResult, Entity, ItemId, MAX_QUANTITY, ensure_bounded};

/// A stock-keeping unit with a tracked on-hand quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub category_id: Option<CategoryId>,
    quantity: i64,
    pub low_stock_threshold: i64,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for creating an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub name: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub low_stock_threshold: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Partial update of an item's descriptive fields and threshold.
///
/// Quantity is deliberately absent; stock moves through issuance, request
/// fulfillment, returns and explicit adjustments only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    #[serde(default)]
    pub name: Option<String>,
    /// `Some(None)` detaches the item from its category.
    #[serde(default, with = "double_option")]
    pub category_id: Option<Option<CategoryId>>,
    #[serde(default)]
    pub low_stock_threshold: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl ItemDraft {
    pub fn validate(&self) -> DomainResult<()> {
        validate_name(&self.name)?;
        if self.quantity < 0 {
            return Err(DomainError::invalid_input("quantity cannot be negative"));
        }
        ensure_bounded("quantity", self.quantity)?;
        validate_threshold(self.low_stock_threshold)
    }

    /// Build the item this draft describes. Validates first.
    pub fn into_item(self, id: ItemId, now: DateTime<Utc>) -> DomainResult<Item> {
        self.validate()?;
        Ok(Item {
            id,
            name: self.name.trim().to_string(),
            category_id: self.category_id,
            quantity: self.quantity,
            low_stock_threshold: self.low_stock_threshold,
            description: self.description,
            unit: self.unit,
            location: self.location,
            created_at: now,
            updated_at: now,
        })
    }
}

impl ItemPatch {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(t) = self.low_stock_threshold {
            validate_threshold(t)?;
        }
        Ok(())
    }
}

impl Item {
    /// Rehydrate an item from storage, re-checking the stored invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: ItemId,
        name: String,
        category_id: Option<CategoryId>,
        quantity: i64,
        low_stock_threshold: i64,
        description: Option<String>,
        unit: Option<String>,
        location: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity < 0 {
            return Err(DomainError::invalid_input(format!(
                "stored quantity for item {id} is negative"
            )));
        }
        Ok(Self {
            id,
            name,
            category_id,
            quantity,
            low_stock_threshold,
            description,
            unit,
            location,
            created_at,
            updated_at,
        })
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn is_low(&self) -> bool {
        crate::is_low(self)
    }

    /// Quantity after applying `delta`, or `InsufficientStock` if that would
    /// be negative. Results above [`MAX_QUANTITY`] are `InvalidInput`. Does
    /// not mutate.
    pub fn checked_quantity(&self, delta: i64) -> DomainResult<i64> {
        let next = self
            .quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::invalid_input("quantity overflow"))?;
        if next < 0 {
            return Err(DomainError::insufficient_stock(
                self.name.clone(),
                delta.saturating_neg(),
                self.quantity,
            ));
        }
        if next > MAX_QUANTITY {
            return Err(DomainError::invalid_input(format!(
                "quantity of {} would exceed {MAX_QUANTITY}",
                self.name
            )));
        }
        Ok(next)
    }

    /// The single mutation point for on-hand quantity.
    pub fn apply_delta(&mut self, delta: i64, now: DateTime<Utc>) -> DomainResult<i64> {
        let next = self.checked_quantity(delta)?;
        self.quantity = next;
        self.updated_at = now;
        Ok(next)
    }

    pub fn apply_patch(&mut self, patch: ItemPatch, now: DateTime<Utc>) -> DomainResult<()> {
        patch.validate()?;
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(category_id) = patch.category_id {
            self.category_id = category_id;
        }
        if let Some(t) = patch.low_stock_threshold {
            self.low_stock_threshold = t;
        }
        if patch.description.is_some() {
            self.description = patch.description;
        }
        if patch.unit.is_some() {
            self.unit = patch.unit;
        }
        if patch.location.is_some() {
            self.location = patch.location;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Category detach, used when the referenced category is deleted.
    pub fn detach_category(&mut self, now: DateTime<Utc>) {
        self.category_id = None;
        self.updated_at = now;
    }
}

fn validate_name(name: &str) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::invalid_input("name cannot be empty"));
    }
    Ok(())
}

fn validate_threshold(t: i64) -> DomainResult<()> {
    if t < 0 {
        return Err(DomainError::invalid_input("low_stock_threshold cannot be negative"));
    }
    ensure_bounded("low_stock_threshold", t)
}

/// Distinguishes an absent field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            None => serializer.serialize_none(),
            Some(inner) => inner.serialize(serializer),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
