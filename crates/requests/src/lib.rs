//! Material request / item return workflow (pure domain logic).
//!
//! A request moves `pending → approved → completed` or `pending → rejected`.
//! Deciding and finalizing are aggregate commands; the resulting events tell
//! the infrastructure which stock movements to apply inside its unit of work.

pub mod approval;
pub mod request;

pub use approval::{Approval, Approver, ApproverSelection, Decision, NewApprover};
pub use request::{
    Decide, Finalize, FulfilledLine, LineFulfilled, NewRequest, NewRequestLine, Request,
    RequestCommand, RequestEvent, RequestItem, RequestStatus, RequestType, RequesterInfo,
};
