//! Catalog administration: items, categories, stock adjustments and the
//! approver registry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use storekeep_core::{CategoryId, DomainError, ItemId, UserId, ensure_bounded};
use storekeep_inventory::{Category, Item, ItemDraft, ItemPatch, LowStockAlert, NewCategory};
use storekeep_requests::{Approver, NewApprover};

use crate::error::OperationResult;
use crate::notify::{Notifier, Signal, dispatch};
use crate::store::InventoryStore;

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn InventoryStore>,
    notifier: Arc<dyn Notifier>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn InventoryStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    #[instrument(skip(self, draft), fields(name = %draft.name), err)]
    pub async fn create_item(&self, draft: ItemDraft) -> OperationResult<Item> {
        draft.validate()?;
        let now = Utc::now();
        let item = draft.into_item(ItemId::new(), now)?;

        let mut uow = self.store.begin().await?;
        if let Some(category_id) = item.category_id {
            uow.lock_category(category_id).await?;
        }
        uow.insert_item(&item).await?;
        uow.commit().await?;

        self.check_low(&item, now);
        Ok(item)
    }

    /// Update descriptive fields, category and threshold. Quantity is not
    /// touched here.
    #[instrument(skip(self, patch), fields(item_id = %id), err)]
    pub async fn update_item(&self, id: ItemId, patch: ItemPatch) -> OperationResult<Item> {
        patch.validate()?;
        let now = Utc::now();

        let mut uow = self.store.begin().await?;
        if let Some(Some(category_id)) = patch.category_id {
            uow.lock_category(category_id).await?;
        }
        let mut item = uow.lock_item(id).await?;
        item.apply_patch(patch, now)?;
        uow.update_item(&item).await?;
        uow.commit().await?;

        self.check_low(&item, now);
        Ok(item)
    }

    /// Refused with `Conflict` while issuances or request lines reference it.
    #[instrument(skip(self), fields(item_id = %id), err)]
    pub async fn delete_item(&self, id: ItemId) -> OperationResult<()> {
        let mut uow = self.store.begin().await?;
        uow.delete_item(id).await?;
        uow.commit().await?;
        Ok(())
    }

    /// Manual correction or restock: `quantity += delta`.
    #[instrument(skip(self), fields(item_id = %id), err)]
    pub async fn adjust_stock(&self, id: ItemId, delta: i64) -> OperationResult<Item> {
        if delta == 0 {
            return Err(DomainError::invalid_input("delta cannot be zero").into());
        }
        ensure_bounded("delta", delta)?;
        let now = Utc::now();

        let mut uow = self.store.begin().await?;
        let item = uow.adjust_quantity(id, delta, now).await?;
        uow.commit().await?;

        tracing::info!(delta, quantity = item.quantity(), "stock adjusted");
        self.check_low(&item, now);
        Ok(item)
    }

    /// Names are unique, case-insensitively.
    #[instrument(skip(self, new), fields(name = %new.name), err)]
    pub async fn create_category(&self, new: NewCategory) -> OperationResult<Category> {
        let category = new.into_category(CategoryId::new(), Utc::now())?;
        let mut uow = self.store.begin().await?;
        uow.insert_category(&category).await?;
        uow.commit().await?;
        Ok(category)
    }

    /// Delete a category and detach its items. Returns how many items were
    /// detached.
    #[instrument(skip(self), fields(category_id = %id), err)]
    pub async fn delete_category(&self, id: CategoryId) -> OperationResult<u64> {
        let mut uow = self.store.begin().await?;
        let detached = uow.delete_category(id).await?;
        uow.commit().await?;
        Ok(detached)
    }

    #[instrument(skip(self, new), fields(user_id = %new.user_id), err)]
    pub async fn register_approver(&self, new: NewApprover) -> OperationResult<Approver> {
        let approver = new.into_approver(Utc::now())?;
        let mut uow = self.store.begin().await?;
        uow.insert_approver(&approver).await?;
        uow.commit().await?;
        Ok(approver)
    }

    /// Inactive approvers are skipped by "all current approvers" and cannot
    /// be picked explicitly. Existing assignments are kept.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn deactivate_approver(&self, user_id: UserId) -> OperationResult<Approver> {
        let mut uow = self.store.begin().await?;
        let approver = uow.set_approver_active(user_id, false).await?;
        uow.commit().await?;
        Ok(approver)
    }

    fn check_low(&self, item: &Item, at: DateTime<Utc>) {
        if let Some(alert) = LowStockAlert::for_item(item) {
            dispatch(
                self.notifier.as_ref(),
                Signal::LowStock {
                    alert,
                    occurred_at: at,
                },
            );
        }
    }
}
