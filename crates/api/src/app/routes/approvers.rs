use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use storekeep_auth::Permission;
use storekeep_core::UserId;
use storekeep_requests::NewApprover;

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_approvers).post(register_approver))
        .route("/:id/deactivate", post(deactivate_approver))
}

pub async fn list_approvers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_READ)?;
    let approvers = services
        .queries()
        .list_approvers()
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok(Json(approvers).into_response())
}

pub async fn register_approver(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewApprover>,
) -> ApiResult {
    authz::require(&principal, Permission::APPROVERS_MANAGE)?;
    let approver = services
        .catalog()
        .register_approver(body)
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok((StatusCode::CREATED, Json(approver)).into_response())
}

pub async fn deactivate_approver(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, Permission::APPROVERS_MANAGE)?;
    let id: UserId = dto::parse_id(&id)?;
    let approver = services
        .catalog()
        .deactivate_approver(id)
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok(Json(approver).into_response())
}
