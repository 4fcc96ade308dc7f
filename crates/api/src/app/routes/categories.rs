use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
};

use storekeep_auth::Permission;
use storekeep_core::CategoryId;
use storekeep_inventory::NewCategory;

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/:id", delete(delete_category))
}

pub async fn list_categories(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_READ)?;
    let categories = services
        .queries()
        .list_categories()
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok(Json(categories).into_response())
}

pub async fn create_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewCategory>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_MANAGE)?;
    let category = services
        .catalog()
        .create_category(body)
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok((StatusCode::CREATED, Json(category)).into_response())
}

/// Items in the category are kept, with their category cleared.
pub async fn delete_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_MANAGE)?;
    let id: CategoryId = dto::parse_id(&id)?;
    let detached = services
        .catalog()
        .delete_category(id)
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok(Json(serde_json::json!({ "id": id, "detached_items": detached })).into_response())
}
