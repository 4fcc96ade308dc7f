use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use storekeep_auth::Permission;
use storekeep_core::RequestId;
use storekeep_infra::queries::RequestFilter;
use storekeep_requests::Decision;

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/:id", get(get_request))
        .route("/:id/approve", post(approve))
        .route("/:id/reject", post(reject))
        .route("/:id/finalize", post(finalize))
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(filter): Query<RequestFilter>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_READ)?;
    let rows = services
        .queries()
        .list_requests(&filter)
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok(Json(rows).into_response())
}

pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_READ)?;
    let id: RequestId = dto::parse_id(&id)?;
    match services
        .queries()
        .request_details(id)
        .await
        .map_err(errors::operation_error_to_response)?
    {
        Some(details) => Ok(Json(details).into_response()),
        None => Err(errors::json_error(StatusCode::NOT_FOUND, "not_found", "request not found")),
    }
}

pub async fn create_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateRequestBody>,
) -> ApiResult {
    authz::require(&principal, Permission::REQUESTS_CREATE)?;
    let (new, approvers) = body.into_parts();
    let request = services
        .workflow()
        .create_request(principal.user_id(), new, approvers)
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok((StatusCode::CREATED, Json(request)).into_response())
}

pub async fn approve(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::DecisionRequest>>,
) -> ApiResult {
    decide(&services, &principal, &id, Decision::Approve, body).await
}

pub async fn reject(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::DecisionRequest>>,
) -> ApiResult {
    decide(&services, &principal, &id, Decision::Reject, body).await
}

async fn decide(
    services: &AppServices,
    principal: &PrincipalContext,
    id: &str,
    decision: Decision,
    body: Option<Json<dto::DecisionRequest>>,
) -> ApiResult {
    authz::require(principal, Permission::REQUESTS_APPROVE)?;
    let id: RequestId = dto::parse_id(id)?;
    let input = body.map(|Json(b)| b).unwrap_or_default();
    let request = services
        .workflow()
        .decide(id, principal.user_id(), decision, input.into())
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok(Json(request).into_response())
}

/// Move the stock for an approved request and complete it.
pub async fn finalize(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::FinalizeRequest>,
) -> ApiResult {
    authz::require(&principal, Permission::REQUESTS_FINALIZE)?;
    let id: RequestId = dto::parse_id(&id)?;
    let request = services
        .workflow()
        .finalize(id, principal.user_id(), body.items, body.released_by)
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok(Json(request).into_response())
}
