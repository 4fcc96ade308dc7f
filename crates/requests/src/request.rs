use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storekeep_core::{
    Aggregate, ApprovalId, DomainError, DomainResult, Entity, ItemId, RequestId, RequestItemId,
    UserId, ensure_bounded,
};
use storekeep_events::Event;

use crate::approval::{Approval, Decision};

/// Which way stock moves when the request is finalized.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Stock leaves the store on finalize.
    MaterialRequest,
    /// Stock comes back on finalize.
    ItemReturn,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::MaterialRequest => "material_request",
            RequestType::ItemReturn => "item_return",
        }
    }
}

impl core::str::FromStr for RequestType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "material_request" => Ok(RequestType::MaterialRequest),
            "item_return" => Ok(RequestType::ItemReturn),
            other => Err(DomainError::invalid_input(format!("unknown request type '{other}'"))),
        }
    }
}

/// Request status lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Completed,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Rejected)
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "completed" => Ok(RequestStatus::Completed),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(DomainError::invalid_input(format!("unknown status '{other}'"))),
        }
    }
}

/// Who is asking, for what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterInfo {
    pub requester_name: String,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

/// One line of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    pub id: RequestItemId,
    pub request_id: RequestId,
    pub item_id: ItemId,
    pub quantity_requested: i64,
    pub quantity_received: Option<i64>,
    pub quantity_returned: Option<i64>,
}

impl Entity for RequestItem {
    type Id = RequestItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequestLine {
    pub item_id: ItemId,
    pub quantity: i64,
}

/// Input for opening a request. Approvers are resolved separately against
/// the registry and handed to [`Request::open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub request_type: RequestType,
    pub requester: RequesterInfo,
    pub lines: Vec<NewRequestLine>,
}

impl NewRequest {
    /// Shape checks that need no store access.
    pub fn validate(&self) -> DomainResult<()> {
        if self.requester.requester_name.trim().is_empty() {
            return Err(DomainError::invalid_input("requester_name cannot be empty"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::invalid_input("a request needs at least one item"));
        }
        for (idx, line) in self.lines.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(DomainError::invalid_input(format!(
                    "line {}: quantity must be greater than zero",
                    idx + 1
                )));
            }
            ensure_bounded(&format!("line {} quantity", idx + 1), line.quantity)?;
        }
        Ok(())
    }
}

/// Aggregate root: a material request or item return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub created_by: UserId,
    pub requester: RequesterInfo,
    pub assigned_approvers: Vec<UserId>,
    pub lines: Vec<RequestItem>,
    pub approvals: Vec<Approval>,
    pub released_by: Option<String>,
    pub finalized_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Entity for Request {
    type Id = RequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Request {
    /// Open a new pending request. No stock moves at this point.
    pub fn open(
        id: RequestId,
        created_by: UserId,
        new: NewRequest,
        approvers: Vec<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        new.validate()?;
        if approvers.is_empty() {
            return Err(DomainError::invalid_input("no approver could be resolved"));
        }

        let lines = new
            .lines
            .into_iter()
            .map(|l| RequestItem {
                id: RequestItemId::new(),
                request_id: id,
                item_id: l.item_id,
                quantity_requested: l.quantity,
                quantity_received: None,
                quantity_returned: None,
            })
            .collect();

        Ok(Self {
            id,
            request_type: new.request_type,
            status: RequestStatus::Pending,
            created_by,
            requester: RequesterInfo {
                requester_name: new.requester.requester_name.trim().to_string(),
                ..new.requester
            },
            assigned_approvers: approvers,
            lines,
            approvals: Vec::new(),
            released_by: None,
            finalized_by: None,
            created_at: now,
            updated_at: now,
            decided_at: None,
            completed_at: None,
        })
    }

    pub fn is_assigned(&self, approver: UserId) -> bool {
        self.assigned_approvers.contains(&approver)
    }

    pub fn item_count(&self) -> usize {
        self.lines.len()
    }

    /// Saturates instead of overflowing on rows that bypassed validation.
    pub fn total_quantity_requested(&self) -> i64 {
        self.lines
            .iter()
            .fold(0i64, |acc, l| acc.saturating_add(l.quantity_requested))
    }

    fn line(&self, id: RequestItemId) -> Option<&RequestItem> {
        self.lines.iter().find(|l| l.id == id)
    }
}

/// Command: record an approver's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decide {
    pub approval_id: ApprovalId,
    pub approver: UserId,
    pub decision: Decision,
    pub comment: Option<String>,
    pub signature: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// How much of one line was actually handed over (or brought back).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfilledLine {
    pub request_item_id: RequestItemId,
    pub quantity: i64,
}

/// Command: move the stock for an approved request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finalize {
    pub lines: Vec<FulfilledLine>,
    pub released_by: String,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl Finalize {
    pub fn validate(&self) -> DomainResult<()> {
        if self.released_by.trim().is_empty() {
            return Err(DomainError::invalid_input("released_by cannot be empty"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::invalid_input("no fulfilled lines given"));
        }
        for line in &self.lines {
            if line.quantity < 0 {
                return Err(DomainError::invalid_input(format!(
                    "line {}: quantity cannot be negative",
                    line.request_item_id
                )));
            }
            ensure_bounded(&format!("line {} quantity", line.request_item_id), line.quantity)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestCommand {
    Decide(Decide),
    Finalize(Finalize),
}

/// Stock movement for one line, signed the way it hits the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFulfilled {
    pub request_item_id: RequestItemId,
    pub item_id: ItemId,
    pub quantity: i64,
    /// Negative for material requests, positive for returns.
    pub delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestEvent {
    ApprovalRecorded(Approval),
    RequestApproved {
        request_id: RequestId,
        approver: UserId,
        occurred_at: DateTime<Utc>,
    },
    RequestRejected {
        request_id: RequestId,
        approver: UserId,
        occurred_at: DateTime<Utc>,
    },
    RequestCompleted {
        request_id: RequestId,
        released_by: String,
        actor: UserId,
        lines: Vec<LineFulfilled>,
        occurred_at: DateTime<Utc>,
    },
}

impl RequestEvent {
    /// Status the request is in after this event, if the event changes it.
    pub fn resulting_status(&self) -> Option<RequestStatus> {
        match self {
            RequestEvent::ApprovalRecorded(_) => None,
            RequestEvent::RequestApproved { .. } => Some(RequestStatus::Approved),
            RequestEvent::RequestRejected { .. } => Some(RequestStatus::Rejected),
            RequestEvent::RequestCompleted { .. } => Some(RequestStatus::Completed),
        }
    }
}

impl Event for RequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RequestEvent::ApprovalRecorded(_) => "requests.approval.recorded",
            RequestEvent::RequestApproved { .. } => "requests.request.approved",
            RequestEvent::RequestRejected { .. } => "requests.request.rejected",
            RequestEvent::RequestCompleted { .. } => "requests.request.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RequestEvent::ApprovalRecorded(a) => a.decided_at,
            RequestEvent::RequestApproved { occurred_at, .. }
            | RequestEvent::RequestRejected { occurred_at, .. }
            | RequestEvent::RequestCompleted { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Request {
    type Id = RequestId;
    type Command = RequestCommand;
    type Event = RequestEvent;
    type Error = DomainError;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RequestEvent::ApprovalRecorded(a) => {
                self.approvals.push(a.clone());
                self.updated_at = a.decided_at;
            }
            RequestEvent::RequestApproved { occurred_at, .. } => {
                self.status = RequestStatus::Approved;
                self.decided_at = Some(*occurred_at);
                self.updated_at = *occurred_at;
            }
            RequestEvent::RequestRejected { occurred_at, .. } => {
                self.status = RequestStatus::Rejected;
                self.decided_at = Some(*occurred_at);
                self.updated_at = *occurred_at;
            }
            RequestEvent::RequestCompleted {
                released_by,
                actor,
                lines,
                occurred_at,
                ..
            } => {
                let request_type = self.request_type;
                for line in self.lines.iter_mut() {
                    let qty = lines
                        .iter()
                        .find(|f| f.request_item_id == line.id)
                        .map(|f| f.quantity)
                        .unwrap_or(0);
                    match request_type {
                        RequestType::MaterialRequest => line.quantity_received = Some(qty),
                        RequestType::ItemReturn => line.quantity_returned = Some(qty),
                    }
                }
                self.status = RequestStatus::Completed;
                self.released_by = Some(released_by.clone());
                self.finalized_by = Some(*actor);
                self.completed_at = Some(*occurred_at);
                self.updated_at = *occurred_at;
            }
        }
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RequestCommand::Decide(cmd) => self.handle_decide(cmd),
            RequestCommand::Finalize(cmd) => self.handle_finalize(cmd),
        }
    }
}

impl Request {
    fn ensure_status(&self, expected: RequestStatus, action: &str) -> DomainResult<()> {
        if self.status != expected {
            return Err(DomainError::invalid_state(format!(
                "cannot {action} request {}: status is {}, expected {}",
                self.id, self.status, expected
            )));
        }
        Ok(())
    }

    fn handle_decide(&self, cmd: &Decide) -> DomainResult<Vec<RequestEvent>> {
        let action = match cmd.decision {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        };
        self.ensure_status(RequestStatus::Pending, action)?;

        if !self.is_assigned(cmd.approver) {
            return Err(DomainError::forbidden(format!(
                "{} is not an assigned approver of request {}",
                cmd.approver, self.id
            )));
        }

        let approval = Approval {
            id: cmd.approval_id,
            request_id: self.id,
            approver_id: cmd.approver,
            decision: cmd.decision,
            comment: cmd.comment.clone(),
            signature: cmd.signature.clone(),
            decided_at: cmd.occurred_at,
        };

        // First recorded decision wins among the assigned approvers.
        let transition = match cmd.decision {
            Decision::Approve => RequestEvent::RequestApproved {
                request_id: self.id,
                approver: cmd.approver,
                occurred_at: cmd.occurred_at,
            },
            Decision::Reject => RequestEvent::RequestRejected {
                request_id: self.id,
                approver: cmd.approver,
                occurred_at: cmd.occurred_at,
            },
        };

        Ok(vec![RequestEvent::ApprovalRecorded(approval), transition])
    }

    fn handle_finalize(&self, cmd: &Finalize) -> DomainResult<Vec<RequestEvent>> {
        self.ensure_status(RequestStatus::Approved, "finalize")?;
        cmd.validate()?;

        let mut fulfilled: Vec<LineFulfilled> = Vec::with_capacity(cmd.lines.len());
        for given in &cmd.lines {
            let line = self.line(given.request_item_id).ok_or_else(|| {
                DomainError::invalid_input(format!(
                    "line {} does not belong to request {}",
                    given.request_item_id, self.id
                ))
            })?;

            if fulfilled.iter().any(|f| f.request_item_id == line.id) {
                return Err(DomainError::invalid_input(format!(
                    "line {} given more than once",
                    line.id
                )));
            }

            if given.quantity > line.quantity_requested {
                return Err(DomainError::invalid_input(format!(
                    "line {}: {} exceeds the {} requested",
                    line.id, given.quantity, line.quantity_requested
                )));
            }

            let delta = match self.request_type {
                RequestType::MaterialRequest => -given.quantity,
                RequestType::ItemReturn => given.quantity,
            };

            fulfilled.push(LineFulfilled {
                request_item_id: line.id,
                item_id: line.item_id,
                quantity: given.quantity,
                delta,
            });
        }

        Ok(vec![RequestEvent::RequestCompleted {
            request_id: self.id,
            released_by: cmd.released_by.trim().to_string(),
            actor: cmd.actor,
            lines: fulfilled,
            occurred_at: cmd.occurred_at,
        }])
    }
}
