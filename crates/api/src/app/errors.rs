use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use storekeep_core::DomainError;
use storekeep_infra::{OperationError, StoreError};

/// Handlers return the error half as a ready response.
pub type ApiResult = Result<Response, Response>;

pub fn operation_error_to_response(err: OperationError) -> Response {
    match err {
        OperationError::Domain(e) => domain_error_to_response(e),
        OperationError::Store(StoreError::NotFound(msg)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", msg)
        }
        OperationError::Store(StoreError::Conflict(msg)) => {
            json_error(StatusCode::CONFLICT, "conflict", msg)
        }
        OperationError::Store(StoreError::Backend(msg)) => {
            tracing::error!(error = %msg, "store backend failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "storage backend error")
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let message = err.to_string();
    match err {
        DomainError::InvalidInput(_) => json_error(StatusCode::BAD_REQUEST, "invalid_input", message),
        DomainError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        DomainError::InsufficientStock {
            item,
            requested,
            available,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": message,
                "item": item,
                "requested": requested,
                "available": available,
            })),
        )
            .into_response(),
        DomainError::InvalidState(_) => json_error(StatusCode::CONFLICT, "invalid_state", message),
        DomainError::Forbidden(_) => json_error(StatusCode::FORBIDDEN, "forbidden", message),
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
