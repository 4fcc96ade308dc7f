use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use storekeep_auth::Permission;
use storekeep_infra::queries::ItemsOutFilter;
use storekeep_inventory::IssueStock;

use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/", get(list_items_out).post(issue))
}

/// Items-out history, newest first. `from`, `to` and `item_id` narrow it.
pub async fn list_items_out(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(filter): Query<ItemsOutFilter>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_READ)?;
    let rows = services
        .queries()
        .list_items_out(&filter)
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok(Json(rows).into_response())
}

/// Hand stock to a person. 422 with the available amount when short.
pub async fn issue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<IssueStock>,
) -> ApiResult {
    authz::require(&principal, Permission::ISSUANCES_CREATE)?;
    let record = services
        .issuance()
        .issue(principal.user_id(), body)
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}
