//! Stock store: durable tables plus atomic units of work.
//!
//! Every mutating operation runs inside one [`UnitOfWork`]. Row locks taken
//! through `lock_*` are held until the unit commits or is dropped; a dropped
//! unit rolls back everything it staged. Plain reads on [`InventoryStore`]
//! never lock and see committed state only.
//!
//! Lock order: requests, then categories, then items in ascending id order.
//! Callers touching several items must lock them sorted.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use storekeep_core::{CategoryId, ItemId, RequestId, UserId};
use storekeep_inventory::{Category, IssuanceRecord, Item};
use storekeep_requests::{Approval, Approver, Request};

use crate::config::StoreBackend;
use crate::error::{OperationResult, StoreResult};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Open the configured backend. Postgres gets its schema ensured first.
pub async fn open(backend: &StoreBackend) -> StoreResult<Arc<dyn InventoryStore>> {
    match backend {
        StoreBackend::Memory => {
            tracing::info!(backend = "memory", "store opened");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreBackend::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresStore::connect(database_url, *max_connections).await?;
            store.ensure_schema().await?;
            tracing::info!(backend = "postgres", max_connections, "store opened");
            Ok(Arc::new(store))
        }
    }
}

/// Shared store handle. Opened at process start, closed at shutdown.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Open a new atomic unit.
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    async fn item(&self, id: ItemId) -> StoreResult<Option<Item>>;
    async fn items(&self) -> StoreResult<Vec<Item>>;
    async fn categories(&self) -> StoreResult<Vec<Category>>;
    /// Issuance history, unordered.
    async fn issuances(&self) -> StoreResult<Vec<IssuanceRecord>>;
    async fn request(&self, id: RequestId) -> StoreResult<Option<Request>>;
    async fn requests(&self) -> StoreResult<Vec<Request>>;
    async fn approvers(&self) -> StoreResult<Vec<Approver>>;

    /// Release backend resources. Further calls fail.
    async fn close(&self);
}

/// One atomic unit against the store.
///
/// Writes are visible to later reads in the same unit and to everyone else
/// only after [`UnitOfWork::commit`]. Constraint violations (unique names,
/// references to missing rows, deleting a referenced item) surface as
/// `StoreError::Conflict`, at the latest on commit.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Exclusive lock on an item row; returns its current value.
    /// Locking an already-locked row returns this unit's view of it.
    async fn lock_item(&mut self, id: ItemId) -> StoreResult<Item>;

    /// Write back a locked item.
    async fn update_item(&mut self, item: &Item) -> StoreResult<()>;

    async fn insert_item(&mut self, item: &Item) -> StoreResult<()>;

    /// Delete a locked item. Conflict while issuances or request lines
    /// reference it.
    async fn delete_item(&mut self, id: ItemId) -> StoreResult<()>;

    /// Exclusive lock on a category row.
    async fn lock_category(&mut self, id: CategoryId) -> StoreResult<Category>;

    async fn insert_category(&mut self, category: &Category) -> StoreResult<()>;

    /// Delete a locked category and null the reference on its items.
    /// Returns the number of items detached.
    async fn delete_category(&mut self, id: CategoryId) -> StoreResult<u64>;

    async fn insert_issuance(&mut self, record: &IssuanceRecord) -> StoreResult<()>;

    /// Exclusive lock on a request row (lines and approvals included).
    async fn lock_request(&mut self, id: RequestId) -> StoreResult<Request>;

    /// Insert a request with its lines and approver assignment.
    async fn insert_request(&mut self, request: &Request) -> StoreResult<()>;

    /// Write back status, release info and line quantities of a locked request.
    async fn update_request(&mut self, request: &Request) -> StoreResult<()>;

    async fn insert_approval(&mut self, approval: &Approval) -> StoreResult<()>;

    /// Conflict if the user is already registered.
    async fn insert_approver(&mut self, approver: &Approver) -> StoreResult<()>;

    async fn set_approver_active(&mut self, user_id: UserId, active: bool) -> StoreResult<Approver>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// `quantity += delta` on one item, inside this unit.
    ///
    /// Locks the row first, then checks the non-negative invariant against
    /// the locked value. Fails with `InsufficientStock` (nothing written) or
    /// `NotFound`.
    async fn adjust_quantity(
        &mut self,
        id: ItemId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> OperationResult<Item> {
        let mut item = self.lock_item(id).await?;
        item.apply_delta(delta, now)?;
        self.update_item(&item).await?;
        Ok(item)
    }
}
