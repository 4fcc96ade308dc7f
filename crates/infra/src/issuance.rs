//! Direct "take N units out" operations.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use storekeep_core::{IssuanceId, UserId};
use storekeep_inventory::{IssuanceRecord, IssueStock, LowStockAlert};

use crate::error::OperationResult;
use crate::notify::{Notifier, Signal, dispatch};
use crate::store::InventoryStore;

/// Issues stock as one atomic unit: lock the item, check, decrement, record.
///
/// Not idempotent. Every successful call is a new issuance, so callers must
/// not retry blindly after an ambiguous failure.
#[derive(Clone)]
pub struct IssuanceEngine {
    store: Arc<dyn InventoryStore>,
    notifier: Arc<dyn Notifier>,
}

impl IssuanceEngine {
    pub fn new(store: Arc<dyn InventoryStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    #[instrument(
        skip(self, cmd),
        fields(item_id = %cmd.item_id, quantity = cmd.quantity, actor = %actor),
        err
    )]
    pub async fn issue(&self, actor: UserId, cmd: IssueStock) -> OperationResult<IssuanceRecord> {
        cmd.validate()?;

        let now = Utc::now();
        let mut uow = self.store.begin().await?;
        // Lock, check and decrement under the same row lock.
        let item = uow.adjust_quantity(cmd.item_id, -cmd.quantity, now).await?;
        let record = cmd.into_record(IssuanceId::new(), actor, now);
        uow.insert_issuance(&record).await?;
        uow.commit().await?;

        tracing::info!(
            issuance_id = %record.id,
            remaining = item.quantity(),
            "stock issued"
        );

        if let Some(alert) = LowStockAlert::for_item(&item) {
            dispatch(
                self.notifier.as_ref(),
                Signal::LowStock {
                    alert,
                    occurred_at: now,
                },
            );
        }
        Ok(record)
    }
}
