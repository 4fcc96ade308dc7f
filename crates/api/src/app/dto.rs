//! Request bodies and small mapping helpers.
//!
//! Domain input types that already derive `Deserialize` (`ItemDraft`,
//! `ItemPatch`, `NewCategory`, `NewApprover`, `IssueStock`) are taken as
//! bodies directly; the structs here cover the rest.

use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;

use storekeep_core::DomainError;
use storekeep_infra::DecisionInput;
use storekeep_requests::{
    ApproverSelection, FulfilledLine, NewRequest, NewRequestLine, RequestType, RequesterInfo,
};

use crate::app::errors;

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    #[serde(rename = "type")]
    pub request_type: RequestType,
    #[serde(flatten)]
    pub requester: RequesterInfo,
    pub items: Vec<NewRequestLine>,
    /// Defaults to every active approver.
    #[serde(default)]
    pub approvers: Option<ApproverSelection>,
}

impl CreateRequestBody {
    pub fn into_parts(self) -> (NewRequest, ApproverSelection) {
        (
            NewRequest {
                request_type: self.request_type,
                requester: self.requester,
                lines: self.items,
            },
            self.approvers.unwrap_or(ApproverSelection::AllCurrent),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

impl From<DecisionRequest> for DecisionInput {
    fn from(body: DecisionRequest) -> Self {
        DecisionInput {
            comment: body.comment,
            signature: body.signature,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub items: Vec<FulfilledLine>,
    pub released_by: String,
}

/// Parse a path segment into a typed id, or a 400 response.
pub fn parse_id<T>(raw: &str) -> Result<T, Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse::<T>()
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
