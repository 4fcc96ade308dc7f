//! Request workflow engine: create, decide, finalize.
//!
//! The [`Request`] aggregate decides; this engine loads it under a row lock,
//! persists what it decided and applies the resulting stock movements in
//! the same unit of work.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use storekeep_core::{Aggregate, ApprovalId, DomainError, ItemId, RequestId, UserId};
use storekeep_inventory::{Item, LowStockAlert, low_stock_alerts};
use storekeep_requests::{
    ApproverSelection, Decide, Decision, Finalize, FulfilledLine, LineFulfilled, NewRequest, Request,
    RequestCommand, RequestEvent,
};

use crate::error::OperationResult;
use crate::notify::{Notifier, Signal, dispatch};
use crate::store::InventoryStore;

/// An approver's decision as it arrives from the transport.
#[derive(Debug, Clone, Default)]
pub struct DecisionInput {
    pub comment: Option<String>,
    pub signature: Option<String>,
}

#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn InventoryStore>,
    notifier: Arc<dyn Notifier>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn InventoryStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Open a pending request. No stock moves.
    ///
    /// Every line must reference an existing item and the selection must
    /// resolve to at least one active approver; both are checked before the
    /// unit of work starts.
    #[instrument(
        skip(self, new, approvers),
        fields(actor = %actor, request_type = new.request_type.as_str(), lines = new.lines.len()),
        err
    )]
    pub async fn create_request(
        &self,
        actor: UserId,
        new: NewRequest,
        approvers: ApproverSelection,
    ) -> OperationResult<Request> {
        new.validate()?;

        let registry = self.store.approvers().await?;
        let assigned = approvers.resolve(&registry)?;

        let mut seen = HashSet::new();
        for line in &new.lines {
            if seen.insert(line.item_id) && self.store.item(line.item_id).await?.is_none() {
                return Err(DomainError::invalid_input(format!("unknown item {}", line.item_id)).into());
            }
        }

        let request = Request::open(RequestId::new(), actor, new, assigned, Utc::now())?;

        let mut uow = self.store.begin().await?;
        uow.insert_request(&request).await?;
        uow.commit().await?;

        tracing::info!(request_id = %request.id, approvers = request.assigned_approvers.len(), "request created");
        self.status_changed(&request, actor, request.created_at);
        Ok(request)
    }

    pub async fn approve(
        &self,
        request_id: RequestId,
        approver: UserId,
        input: DecisionInput,
    ) -> OperationResult<Request> {
        self.decide(request_id, approver, Decision::Approve, input).await
    }

    pub async fn reject(
        &self,
        request_id: RequestId,
        approver: UserId,
        input: DecisionInput,
    ) -> OperationResult<Request> {
        self.decide(request_id, approver, Decision::Reject, input).await
    }

    /// Record a decision. The first one recorded settles the request.
    #[instrument(
        skip(self, input),
        fields(request_id = %request_id, approver = %approver, decision = decision.as_str()),
        err
    )]
    pub async fn decide(
        &self,
        request_id: RequestId,
        approver: UserId,
        decision: Decision,
        input: DecisionInput,
    ) -> OperationResult<Request> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;
        let mut request = uow.lock_request(request_id).await?;

        let events = request.execute(&RequestCommand::Decide(Decide {
            approval_id: ApprovalId::new(),
            approver,
            decision,
            comment: input.comment,
            signature: input.signature,
            occurred_at: now,
        }))?;

        for event in &events {
            if let RequestEvent::ApprovalRecorded(approval) = event {
                uow.insert_approval(approval).await?;
            }
        }
        uow.update_request(&request).await?;
        uow.commit().await?;

        self.status_changed(&request, approver, now);
        Ok(request)
    }

    /// Move the stock for an approved request and complete it.
    ///
    /// All lines go through one unit of work: a single line short on stock
    /// rolls back every movement. Lines of the same item are summed and
    /// items are locked in id order.
    #[instrument(
        skip(self, lines, released_by),
        fields(request_id = %request_id, actor = %actor, lines = lines.len()),
        err
    )]
    pub async fn finalize(
        &self,
        request_id: RequestId,
        actor: UserId,
        lines: Vec<FulfilledLine>,
        released_by: String,
    ) -> OperationResult<Request> {
        let now = Utc::now();
        let cmd = Finalize {
            lines,
            released_by,
            actor,
            occurred_at: now,
        };
        cmd.validate()?;

        let mut uow = self.store.begin().await?;
        let mut request = uow.lock_request(request_id).await?;

        let events = request.execute(&RequestCommand::Finalize(cmd))?;
        let moved: &[LineFulfilled] = events
            .iter()
            .find_map(|e| match e {
                RequestEvent::RequestCompleted { lines, .. } => Some(lines.as_slice()),
                _ => None,
            })
            .unwrap_or_default();

        let mut per_item: BTreeMap<ItemId, i64> = BTreeMap::new();
        for line in moved {
            let total = per_item.entry(line.item_id).or_default();
            *total = total.checked_add(line.delta).ok_or_else(|| {
                DomainError::invalid_input(format!("combined quantity for item {} overflows", line.item_id))
            })?;
        }

        let mut touched: Vec<Item> = Vec::with_capacity(per_item.len());
        for (item_id, delta) in per_item {
            if delta == 0 {
                continue;
            }
            touched.push(uow.adjust_quantity(item_id, delta, now).await?);
        }

        uow.update_request(&request).await?;
        uow.commit().await?;

        tracing::info!(
            request_id = %request.id,
            items_moved = touched.len(),
            released_by = request.released_by.as_deref().unwrap_or_default(),
            "request finalized"
        );

        self.status_changed(&request, actor, now);
        if touched.iter().any(Item::is_low) {
            self.low_stock_snapshot(&touched, now).await;
        }
        Ok(request)
    }

    fn status_changed(&self, request: &Request, actor: UserId, at: DateTime<Utc>) {
        dispatch(
            self.notifier.as_ref(),
            Signal::RequestStatusChanged {
                request_id: request.id,
                request_type: request.request_type,
                status: request.status,
                actor,
                occurred_at: at,
            },
        );
    }

    /// Full low-stock set after a bulk change. Falls back to the touched
    /// items if the store cannot be read.
    async fn low_stock_snapshot(&self, touched: &[Item], at: DateTime<Utc>) {
        let alerts: Vec<LowStockAlert> = match self.store.items().await {
            Ok(items) => low_stock_alerts(&items),
            Err(e) => {
                tracing::warn!(error = %e, "low-stock snapshot read failed; using touched items");
                low_stock_alerts(touched)
            }
        };
        dispatch(
            self.notifier.as_ref(),
            Signal::LowStockSnapshot {
                alerts,
                occurred_at: at,
            },
        );
    }
}
