//! In-memory store for tests, dev and single-process deployments.
//!
//! Row locks are per-key `tokio::sync::Mutex`es whose owned guards live in
//! the unit of work. Writes are staged in the unit and applied on commit
//! under one table-wide write lock, with an undo log so a constraint failure
//! halfway through leaves nothing behind.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use storekeep_core::{CategoryId, Entity, IssuanceId, ItemId, RequestId, UserId};
use storekeep_inventory::{Category, IssuanceRecord, Item};
use storekeep_requests::{Approval, Approver, Request};

use crate::error::{StoreError, StoreResult};

use super::{InventoryStore, UnitOfWork};

/// Rows of one entity type keyed by id.
#[derive(Debug, Clone)]
struct Table<E: Entity> {
    rows: HashMap<E::Id, E>,
}

impl<E: Entity> Default for Table<E> {
    fn default() -> Self {
        Self { rows: HashMap::new() }
    }
}

impl<E: Entity + Clone> Table<E> {
    fn get(&self, id: &E::Id) -> Option<&E> {
        self.rows.get(id)
    }

    fn contains(&self, id: &E::Id) -> bool {
        self.rows.contains_key(id)
    }

    fn put(&mut self, row: E) -> Option<E> {
        self.rows.insert(row.id().clone(), row)
    }

    fn remove(&mut self, id: &E::Id) -> Option<E> {
        self.rows.remove(id)
    }

    /// Put back what was there before a write.
    fn restore(&mut self, id: E::Id, previous: Option<E>) {
        match previous {
            Some(row) => {
                self.rows.insert(id, row);
            }
            None => {
                self.rows.remove(&id);
            }
        }
    }

    fn values(&self) -> impl Iterator<Item = &E> {
        self.rows.values()
    }

    fn cloned(&self) -> Vec<E> {
        self.rows.values().cloned().collect()
    }
}

#[derive(Debug, Default)]
struct Tables {
    items: Table<Item>,
    categories: Table<Category>,
    issuances: Table<IssuanceRecord>,
    requests: Table<Request>,
    approvers: Table<Approver>,
}

impl Tables {
    fn item_referenced(&self, id: ItemId) -> bool {
        self.issuances.values().any(|r| r.item_id == id)
            || self
                .requests
                .values()
                .any(|r| r.lines.iter().any(|l| l.item_id == id))
    }

    fn category_name_taken(&self, category: &Category) -> bool {
        let key = category.name_key();
        self.categories
            .values()
            .any(|c| c.id != category.id && c.name_key() == key)
    }

    fn check_item_refs(&self, item: &Item) -> StoreResult<()> {
        if let Some(cid) = item.category_id {
            if !self.categories.contains(&cid) {
                return Err(StoreError::Conflict(format!(
                    "item {} references missing category {cid}",
                    item.id
                )));
            }
        }
        Ok(())
    }
}

/// Per-key exclusive locks, created on first use and dropped again once
/// nobody holds or waits on them.
#[derive(Debug)]
struct RowLocks<K> {
    rows: Arc<Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>>,
}

impl<K> Default for RowLocks<K> {
    fn default() -> Self {
        Self {
            rows: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Copy + Send + 'static> RowLocks<K> {
    async fn acquire(&self, key: K) -> RowGuard {
        let lock = {
            let mut rows = self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rows.entry(key).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        let rows = Arc::clone(&self.rows);
        RowGuard {
            guard: Some(guard),
            release: Some(Box::new(move || prune_idle(&rows, key))),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

/// Waiters clone the `Arc` under the map lock, so a count of one here means
/// the map holds the only reference.
fn prune_idle<K: Eq + Hash>(rows: &Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>, key: K) {
    let mut rows = rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if rows.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
        rows.remove(&key);
    }
}

/// A held row lock.
struct RowGuard {
    guard: Option<OwnedMutexGuard<()>>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    item_locks: RowLocks<ItemId>,
    category_locks: RowLocks<CategoryId>,
    request_locks: RowLocks<RequestId>,
    approver_locks: RowLocks<UserId>,
    closed: AtomicBool,
}

impl Shared {
    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Backend("store is closed".to_string()));
        }
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("table lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("table lock poisoned".to_string()))
    }
}

/// In-memory [`InventoryStore`]. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        // Fails fast once closed.
        drop(self.shared.read()?);
        Ok(Box::new(InMemoryUnit::new(self.shared.clone())))
    }

    async fn item(&self, id: ItemId) -> StoreResult<Option<Item>> {
        Ok(self.shared.read()?.items.get(&id).cloned())
    }

    async fn items(&self) -> StoreResult<Vec<Item>> {
        Ok(self.shared.read()?.items.cloned())
    }

    async fn categories(&self) -> StoreResult<Vec<Category>> {
        Ok(self.shared.read()?.categories.cloned())
    }

    async fn issuances(&self) -> StoreResult<Vec<IssuanceRecord>> {
        Ok(self.shared.read()?.issuances.cloned())
    }

    async fn request(&self, id: RequestId) -> StoreResult<Option<Request>> {
        Ok(self.shared.read()?.requests.get(&id).cloned())
    }

    async fn requests(&self) -> StoreResult<Vec<Request>> {
        Ok(self.shared.read()?.requests.cloned())
    }

    async fn approvers(&self) -> StoreResult<Vec<Approver>> {
        Ok(self.shared.read()?.approvers.cloned())
    }

    async fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

#[derive(Debug)]
enum Write {
    InsertItem(Item),
    UpdateItem(Item),
    DeleteItem(ItemId),
    InsertCategory(Category),
    DeleteCategory(CategoryId),
    InsertIssuance(IssuanceRecord),
    InsertRequest(Request),
    UpdateRequest(Request),
    InsertApproval(Approval),
    InsertApprover(Approver),
    UpdateApprover(Approver),
}

#[derive(Debug)]
enum Undo {
    Item(ItemId, Option<Item>),
    Category(CategoryId, Option<Category>),
    Issuance(IssuanceId, Option<IssuanceRecord>),
    Request(RequestId, Option<Request>),
    Approver(UserId, Option<Approver>),
}

impl Undo {
    fn revert(self, t: &mut Tables) {
        match self {
            Undo::Item(id, prev) => t.items.restore(id, prev),
            Undo::Category(id, prev) => t.categories.restore(id, prev),
            Undo::Issuance(id, prev) => t.issuances.restore(id, prev),
            Undo::Request(id, prev) => t.requests.restore(id, prev),
            Undo::Approver(id, prev) => t.approvers.restore(id, prev),
        }
    }
}

/// Unit of work over [`InMemoryStore`].
///
/// `*_view` maps hold this unit's current value of every row it has locked
/// or created; a key in `held_*` without a view was deleted by this unit.
pub struct InMemoryUnit {
    shared: Arc<Shared>,
    guards: Vec<RowGuard>,
    held_items: HashSet<ItemId>,
    held_categories: HashSet<CategoryId>,
    held_requests: HashSet<RequestId>,
    held_approvers: HashSet<UserId>,
    item_view: HashMap<ItemId, Item>,
    category_view: HashMap<CategoryId, Category>,
    request_view: HashMap<RequestId, Request>,
    approver_view: HashMap<UserId, Approver>,
    writes: Vec<Write>,
}

impl InMemoryUnit {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            guards: Vec::new(),
            held_items: HashSet::new(),
            held_categories: HashSet::new(),
            held_requests: HashSet::new(),
            held_approvers: HashSet::new(),
            item_view: HashMap::new(),
            category_view: HashMap::new(),
            request_view: HashMap::new(),
            approver_view: HashMap::new(),
            writes: Vec::new(),
        }
    }

    fn apply(t: &mut Tables, write: Write, undo: &mut Vec<Undo>) -> StoreResult<()> {
        match write {
            Write::InsertItem(item) => {
                if t.items.contains(&item.id) {
                    return Err(StoreError::Conflict(format!("item {} already exists", item.id)));
                }
                t.check_item_refs(&item)?;
                let id = item.id;
                undo.push(Undo::Item(id, t.items.put(item)));
            }
            Write::UpdateItem(item) => {
                if !t.items.contains(&item.id) {
                    return Err(StoreError::NotFound(format!("item {}", item.id)));
                }
                t.check_item_refs(&item)?;
                let id = item.id;
                undo.push(Undo::Item(id, t.items.put(item)));
            }
            Write::DeleteItem(id) => {
                if t.item_referenced(id) {
                    return Err(StoreError::Conflict(format!(
                        "item {id} is referenced by issuances or requests"
                    )));
                }
                let prev = t.items.remove(&id);
                if prev.is_none() {
                    return Err(StoreError::NotFound(format!("item {id}")));
                }
                undo.push(Undo::Item(id, prev));
            }
            Write::InsertCategory(category) => {
                if t.category_name_taken(&category) {
                    return Err(StoreError::Conflict(format!(
                        "category name '{}' is already taken",
                        category.name
                    )));
                }
                let id = category.id;
                undo.push(Undo::Category(id, t.categories.put(category)));
            }
            Write::DeleteCategory(id) => {
                let prev = t.categories.remove(&id);
                if prev.is_none() {
                    return Err(StoreError::NotFound(format!("category {id}")));
                }
                undo.push(Undo::Category(id, prev));
            }
            Write::InsertIssuance(record) => {
                if !t.items.contains(&record.item_id) {
                    return Err(StoreError::Conflict(format!(
                        "issuance references missing item {}",
                        record.item_id
                    )));
                }
                let id = record.id;
                undo.push(Undo::Issuance(id, t.issuances.put(record)));
            }
            Write::InsertRequest(request) => {
                if t.requests.contains(&request.id) {
                    return Err(StoreError::Conflict(format!("request {} already exists", request.id)));
                }
                if let Some(line) = request.lines.iter().find(|l| !t.items.contains(&l.item_id)) {
                    return Err(StoreError::Conflict(format!(
                        "request line references missing item {}",
                        line.item_id
                    )));
                }
                if let Some(a) = request
                    .assigned_approvers
                    .iter()
                    .find(|a| !t.approvers.contains(a))
                {
                    return Err(StoreError::Conflict(format!("approver {a} is not registered")));
                }
                let id = request.id;
                undo.push(Undo::Request(id, t.requests.put(request)));
            }
            Write::UpdateRequest(request) => {
                let Some(stored) = t.requests.get(&request.id) else {
                    return Err(StoreError::NotFound(format!("request {}", request.id)));
                };
                // Approvals are appended separately.
                let approvals = stored.approvals.clone();
                let id = request.id;
                let prev = t.requests.put(Request { approvals, ..request });
                undo.push(Undo::Request(id, prev));
            }
            Write::InsertApproval(approval) => {
                let Some(stored) = t.requests.get(&approval.request_id) else {
                    return Err(StoreError::Conflict(format!(
                        "approval references missing request {}",
                        approval.request_id
                    )));
                };
                if !stored.approvals.iter().any(|a| a.id == approval.id) {
                    let mut next = stored.clone();
                    next.approvals.push(approval);
                    let id = next.id;
                    undo.push(Undo::Request(id, t.requests.put(next)));
                }
            }
            Write::InsertApprover(approver) => {
                if t.approvers.contains(&approver.user_id) {
                    return Err(StoreError::Conflict(format!(
                        "approver {} is already registered",
                        approver.user_id
                    )));
                }
                let id = approver.user_id;
                undo.push(Undo::Approver(id, t.approvers.put(approver)));
            }
            Write::UpdateApprover(approver) => {
                let id = approver.user_id;
                undo.push(Undo::Approver(id, t.approvers.put(approver)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnit {
    async fn lock_item(&mut self, id: ItemId) -> StoreResult<Item> {
        if let Some(item) = self.item_view.get(&id) {
            return Ok(item.clone());
        }
        if self.held_items.contains(&id) {
            return Err(StoreError::NotFound(format!("item {id}")));
        }
        let guard = self.shared.item_locks.acquire(id).await;
        self.guards.push(guard);
        self.held_items.insert(id);

        let item = self
            .shared
            .read()?
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("item {id}")))?;
        self.item_view.insert(id, item.clone());
        Ok(item)
    }

    async fn update_item(&mut self, item: &Item) -> StoreResult<()> {
        if !self.item_view.contains_key(&item.id) {
            return Err(StoreError::Backend(format!("item {} is not locked by this unit", item.id)));
        }
        self.item_view.insert(item.id, item.clone());
        self.writes.push(Write::UpdateItem(item.clone()));
        Ok(())
    }

    async fn insert_item(&mut self, item: &Item) -> StoreResult<()> {
        let guard = self.shared.item_locks.acquire(item.id).await;
        self.guards.push(guard);
        self.held_items.insert(item.id);
        self.item_view.insert(item.id, item.clone());
        self.writes.push(Write::InsertItem(item.clone()));
        Ok(())
    }

    async fn delete_item(&mut self, id: ItemId) -> StoreResult<()> {
        self.lock_item(id).await?;
        if self.shared.read()?.item_referenced(id) {
            return Err(StoreError::Conflict(format!(
                "item {id} is referenced by issuances or requests"
            )));
        }
        self.item_view.remove(&id);
        self.writes.push(Write::DeleteItem(id));
        Ok(())
    }

    async fn lock_category(&mut self, id: CategoryId) -> StoreResult<Category> {
        if let Some(c) = self.category_view.get(&id) {
            return Ok(c.clone());
        }
        if self.held_categories.contains(&id) {
            return Err(StoreError::NotFound(format!("category {id}")));
        }
        let guard = self.shared.category_locks.acquire(id).await;
        self.guards.push(guard);
        self.held_categories.insert(id);

        let category = self
            .shared
            .read()?
            .categories
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("category {id}")))?;
        self.category_view.insert(id, category.clone());
        Ok(category)
    }

    async fn insert_category(&mut self, category: &Category) -> StoreResult<()> {
        let taken_here = self
            .category_view
            .values()
            .any(|c| c.id != category.id && c.name_key() == category.name_key());
        if taken_here || self.shared.read()?.category_name_taken(category) {
            return Err(StoreError::Conflict(format!(
                "category name '{}' is already taken",
                category.name
            )));
        }
        self.held_categories.insert(category.id);
        self.category_view.insert(category.id, category.clone());
        self.writes.push(Write::InsertCategory(category.clone()));
        Ok(())
    }

    async fn delete_category(&mut self, id: CategoryId) -> StoreResult<u64> {
        self.lock_category(id).await?;

        // Items can only gain this category while holding its lock, so the
        // set cannot grow under us. Lock them in id order.
        let mut referencing: Vec<ItemId> = self
            .shared
            .read()?
            .items
            .values()
            .filter(|i| i.category_id == Some(id))
            .map(|i| i.id)
            .collect();
        referencing.sort_unstable();

        let mut detached = 0;
        let now = chrono::Utc::now();
        for item_id in referencing {
            let mut item = match self.lock_item(item_id).await {
                Ok(item) => item,
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if item.category_id == Some(id) {
                item.detach_category(now);
                self.update_item(&item).await?;
                detached += 1;
            }
        }

        self.category_view.remove(&id);
        self.writes.push(Write::DeleteCategory(id));
        Ok(detached)
    }

    async fn insert_issuance(&mut self, record: &IssuanceRecord) -> StoreResult<()> {
        self.writes.push(Write::InsertIssuance(record.clone()));
        Ok(())
    }

    async fn lock_request(&mut self, id: RequestId) -> StoreResult<Request> {
        if let Some(r) = self.request_view.get(&id) {
            return Ok(r.clone());
        }
        if self.held_requests.contains(&id) {
            return Err(StoreError::NotFound(format!("request {id}")));
        }
        let guard = self.shared.request_locks.acquire(id).await;
        self.guards.push(guard);
        self.held_requests.insert(id);

        let request = self
            .shared
            .read()?
            .requests
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("request {id}")))?;
        self.request_view.insert(id, request.clone());
        Ok(request)
    }

    async fn insert_request(&mut self, request: &Request) -> StoreResult<()> {
        self.held_requests.insert(request.id);
        self.request_view.insert(request.id, request.clone());
        self.writes.push(Write::InsertRequest(request.clone()));
        Ok(())
    }

    async fn update_request(&mut self, request: &Request) -> StoreResult<()> {
        if !self.request_view.contains_key(&request.id) {
            return Err(StoreError::Backend(format!(
                "request {} is not locked by this unit",
                request.id
            )));
        }
        self.request_view.insert(request.id, request.clone());
        self.writes.push(Write::UpdateRequest(request.clone()));
        Ok(())
    }

    async fn insert_approval(&mut self, approval: &Approval) -> StoreResult<()> {
        self.writes.push(Write::InsertApproval(approval.clone()));
        Ok(())
    }

    async fn insert_approver(&mut self, approver: &Approver) -> StoreResult<()> {
        let guard = self.shared.approver_locks.acquire(approver.user_id).await;
        self.guards.push(guard);
        self.held_approvers.insert(approver.user_id);

        if self.approver_view.contains_key(&approver.user_id)
            || self.shared.read()?.approvers.contains(&approver.user_id)
        {
            return Err(StoreError::Conflict(format!(
                "approver {} is already registered",
                approver.user_id
            )));
        }
        self.approver_view.insert(approver.user_id, approver.clone());
        self.writes.push(Write::InsertApprover(approver.clone()));
        Ok(())
    }

    async fn set_approver_active(&mut self, user_id: UserId, active: bool) -> StoreResult<Approver> {
        if !self.held_approvers.contains(&user_id) {
            let guard = self.shared.approver_locks.acquire(user_id).await;
            self.guards.push(guard);
            self.held_approvers.insert(user_id);
        }

        let current = match self.approver_view.get(&user_id) {
            Some(a) => Some(a.clone()),
            None => self.shared.read()?.approvers.get(&user_id).cloned(),
        };
        let mut approver =
            current.ok_or_else(|| StoreError::NotFound(format!("approver {user_id}")))?;
        approver.active = active;

        self.approver_view.insert(user_id, approver.clone());
        self.writes.push(Write::UpdateApprover(approver.clone()));
        Ok(approver)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = *self;
        let writes = std::mem::take(&mut this.writes);
        {
            let mut tables = this.shared.write()?;
            let mut undo = Vec::with_capacity(writes.len());
            for write in writes {
                if let Err(e) = Self::apply(&mut tables, write, &mut undo) {
                    while let Some(u) = undo.pop() {
                        u.revert(&mut tables);
                    }
                    return Err(e);
                }
            }
        }
        // Row guards drop here, after the writes are visible.
        drop(this);
        Ok(())
    }
}
