//! Read-only projections for dashboards, reports and exports.
//!
//! Everything here is derived from committed state on each call. No locks
//! are taken.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storekeep_core::{CategoryId, IssuanceId, ItemId, RequestId, RequestItemId, UserId};
use storekeep_inventory::{Category, Item, LowStockAlert, low_stock_alerts};
use storekeep_requests::{
    Approval, Approver, Decision, Request, RequestStatus, RequestType, RequesterInfo,
};

use crate::error::OperationResult;
use crate::store::InventoryStore;

/// An item with its resolved category name and low-stock flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemView {
    #[serde(flatten)]
    pub item: Item,
    pub category_name: Option<String>,
    pub is_low: bool,
}

/// One row of the items-out report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemsOutView {
    pub id: IssuanceId,
    pub person_name: String,
    pub item_id: ItemId,
    pub item_name: String,
    pub category_name: Option<String>,
    pub quantity: i64,
    pub issued_by: UserId,
    pub issued_at: DateTime<Utc>,
}

/// Optional narrowing of the items-out report. Bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ItemsOutFilter {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub item_id: Option<ItemId>,
}

impl ItemsOutFilter {
    fn matches(&self, issued_at: DateTime<Utc>, item_id: ItemId) -> bool {
        self.from.is_none_or(|from| issued_at >= from)
            && self.to.is_none_or(|to| issued_at <= to)
            && self.item_id.is_none_or(|id| id == item_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    pub id: RequestId,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub requester_name: String,
    pub team: Option<String>,
    pub created_by: UserId,
    pub item_count: usize,
    pub total_quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Request> for RequestSummary {
    fn from(r: &Request) -> Self {
        Self {
            id: r.id,
            request_type: r.request_type,
            status: r.status,
            requester_name: r.requester.requester_name.clone(),
            team: r.requester.team.clone(),
            created_by: r.created_by,
            item_count: r.item_count(),
            total_quantity: r.total_quantity_requested(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequestFilter {
    #[serde(default)]
    pub status: Option<RequestStatus>,
    #[serde(default, rename = "type")]
    pub request_type: Option<RequestType>,
}

impl RequestFilter {
    fn matches(&self, r: &Request) -> bool {
        self.status.is_none_or(|s| s == r.status) && self.request_type.is_none_or(|t| t == r.request_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestLineView {
    pub id: RequestItemId,
    pub item_id: ItemId,
    pub item_name: Option<String>,
    pub quantity_requested: i64,
    pub quantity_received: Option<i64>,
    pub quantity_returned: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignedApprover {
    pub user_id: UserId,
    pub name: Option<String>,
    pub decision: Option<Decision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestDetails {
    pub id: RequestId,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub created_by: UserId,
    pub requester: RequesterInfo,
    pub lines: Vec<RequestLineView>,
    pub approvers: Vec<AssignedApprover>,
    pub approvals: Vec<Approval>,
    pub released_by: Option<String>,
    pub finalized_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestCounts {
    pub pending: usize,
    pub approved: usize,
    pub completed: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_items: usize,
    pub total_units: i64,
    pub low_stock_count: usize,
    pub category_count: usize,
    pub issuances_total: usize,
    /// Units issued since midnight UTC.
    pub units_issued_today: i64,
    pub requests: RequestCounts,
    pub recent_issuances: Vec<ItemsOutView>,
}

const RECENT_ISSUANCES: usize = 5;

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn InventoryStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Items sorted by name.
    pub async fn list_items(&self) -> OperationResult<Vec<ItemView>> {
        let categories = category_names(&self.store.categories().await?);
        let mut items: Vec<ItemView> = self
            .store
            .items()
            .await?
            .into_iter()
            .map(|item| ItemView {
                category_name: item.category_id.and_then(|c| categories.get(&c).cloned()),
                is_low: item.is_low(),
                item,
            })
            .collect();
        items.sort_by(|a, b| a.item.name.cmp(&b.item.name));
        Ok(items)
    }

    pub async fn list_categories(&self) -> OperationResult<Vec<Category>> {
        let mut categories = self.store.categories().await?;
        categories.sort_by(|a, b| a.name_key().cmp(&b.name_key()));
        Ok(categories)
    }

    pub async fn list_approvers(&self) -> OperationResult<Vec<Approver>> {
        let mut approvers = self.store.approvers().await?;
        approvers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(approvers)
    }

    /// Issuance history joined with item and category names, newest first.
    pub async fn list_items_out(&self, filter: &ItemsOutFilter) -> OperationResult<Vec<ItemsOutView>> {
        let items = self.store.items().await?;
        let categories = category_names(&self.store.categories().await?);
        let by_id: HashMap<ItemId, &Item> = items.iter().map(|i| (i.id, i)).collect();

        let mut rows: Vec<ItemsOutView> = self
            .store
            .issuances()
            .await?
            .into_iter()
            .filter(|r| filter.matches(r.issued_at, r.item_id))
            .map(|r| {
                let item = by_id.get(&r.item_id);
                ItemsOutView {
                    id: r.id,
                    person_name: r.person_name,
                    item_id: r.item_id,
                    item_name: item.map(|i| i.name.clone()).unwrap_or_default(),
                    category_name: item
                        .and_then(|i| i.category_id)
                        .and_then(|c| categories.get(&c).cloned()),
                    quantity: r.quantity,
                    issued_by: r.issued_by,
                    issued_at: r.issued_at,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.issued_at.cmp(&a.issued_at).then_with(|| b.id.cmp(&a.id)));
        Ok(rows)
    }

    /// Low items, lowest quantity first.
    pub async fn list_low_stock(&self) -> OperationResult<Vec<LowStockAlert>> {
        Ok(low_stock_alerts(&self.store.items().await?))
    }

    /// Requests with their item count, newest first.
    pub async fn list_requests(&self, filter: &RequestFilter) -> OperationResult<Vec<RequestSummary>> {
        let mut rows: Vec<RequestSummary> = self
            .store
            .requests()
            .await?
            .iter()
            .filter(|r| filter.matches(r))
            .map(RequestSummary::from)
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(rows)
    }

    /// `None` when no such request exists.
    pub async fn request_details(&self, id: RequestId) -> OperationResult<Option<RequestDetails>> {
        let Some(request) = self.store.request(id).await? else {
            return Ok(None);
        };
        let items = self.store.items().await?;
        let approvers = self.store.approvers().await?;

        let lines = request
            .lines
            .iter()
            .map(|l| RequestLineView {
                id: l.id,
                item_id: l.item_id,
                item_name: items.iter().find(|i| i.id == l.item_id).map(|i| i.name.clone()),
                quantity_requested: l.quantity_requested,
                quantity_received: l.quantity_received,
                quantity_returned: l.quantity_returned,
            })
            .collect();

        let assigned = request
            .assigned_approvers
            .iter()
            .map(|user_id| AssignedApprover {
                user_id: *user_id,
                name: approvers
                    .iter()
                    .find(|a| a.user_id == *user_id)
                    .map(|a| a.name.clone()),
                decision: request
                    .approvals
                    .iter()
                    .find(|a| a.approver_id == *user_id)
                    .map(|a| a.decision),
            })
            .collect();

        Ok(Some(RequestDetails {
            id: request.id,
            request_type: request.request_type,
            status: request.status,
            created_by: request.created_by,
            requester: request.requester,
            lines,
            approvers: assigned,
            approvals: request.approvals,
            released_by: request.released_by,
            finalized_by: request.finalized_by,
            created_at: request.created_at,
            updated_at: request.updated_at,
            decided_at: request.decided_at,
            completed_at: request.completed_at,
        }))
    }

    pub async fn dashboard(&self) -> OperationResult<DashboardStats> {
        self.dashboard_at(Utc::now()).await
    }

    pub async fn dashboard_at(&self, now: DateTime<Utc>) -> OperationResult<DashboardStats> {
        let items = self.store.items().await?;
        let category_count = self.store.categories().await?.len();
        let issuances = self.store.issuances().await?;
        let requests = self.store.requests().await?;

        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);

        let mut counts = RequestCounts::default();
        for r in &requests {
            match r.status {
                RequestStatus::Pending => counts.pending += 1,
                RequestStatus::Approved => counts.approved += 1,
                RequestStatus::Completed => counts.completed += 1,
                RequestStatus::Rejected => counts.rejected += 1,
            }
        }

        let mut recent = self.list_items_out(&ItemsOutFilter::default()).await?;
        recent.truncate(RECENT_ISSUANCES);

        Ok(DashboardStats {
            total_items: items.len(),
            total_units: saturating_total(items.iter().map(Item::quantity)),
            low_stock_count: items.iter().filter(|i| i.is_low()).count(),
            category_count,
            issuances_total: issuances.len(),
            units_issued_today: saturating_total(
                issuances
                    .iter()
                    .filter(|r| r.issued_at >= midnight && r.issued_at <= now)
                    .map(|r| r.quantity),
            ),
            requests: counts,
            recent_issuances: recent,
        })
    }
}

fn saturating_total(quantities: impl Iterator<Item = i64>) -> i64 {
    quantities.fold(0, i64::saturating_add)
}

fn category_names(categories: &[Category]) -> HashMap<CategoryId, String> {
    categories.iter().map(|c| (c.id, c.name.clone())).collect()
}
