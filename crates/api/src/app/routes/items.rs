use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use storekeep_auth::Permission;
use storekeep_core::ItemId;
use storekeep_inventory::{ItemDraft, ItemPatch};

use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::app::dto;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/low-stock", get(list_low_stock))
        .route("/:id", put(update_item).delete(delete_item))
        .route("/:id/adjust", post(adjust_stock))
}

/// Every item with its category name and low-stock flag.
pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_READ)?;
    let items = services
        .queries()
        .list_items()
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok(Json(items).into_response())
}

pub async fn list_low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_READ)?;
    let alerts = services
        .queries()
        .list_low_stock()
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok(Json(alerts).into_response())
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ItemDraft>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_MANAGE)?;
    let item = services
        .catalog()
        .create_item(body)
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok((StatusCode::CREATED, Json(item)).into_response())
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ItemPatch>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_MANAGE)?;
    let id: ItemId = dto::parse_id(&id)?;
    let item = services
        .catalog()
        .update_item(id, body)
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok(Json(item).into_response())
}

pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_MANAGE)?;
    let id: ItemId = dto::parse_id(&id)?;
    services
        .catalog()
        .delete_item(id)
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Manual correction or restock.
pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_MANAGE)?;
    let id: ItemId = dto::parse_id(&id)?;
    let item = services
        .catalog()
        .adjust_stock(id, body.delta)
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok(Json(item).into_response())
}
