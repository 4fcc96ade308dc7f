use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};

use storekeep_auth::Permission;

use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::PrincipalContext;

pub async fn dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&principal, Permission::ITEMS_READ)?;
    let stats = services
        .queries()
        .dashboard()
        .await
        .map_err(errors::operation_error_to_response)?;
    Ok((StatusCode::OK, Json(stats)).into_response())
}
