use axum::{Router, routing::get};

pub mod approvers;
pub mod categories;
pub mod issuances;
pub mod items;
pub mod reports;
pub mod requests;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .route("/dashboard", get(reports::dashboard))
        .nest("/items", items::router())
        .nest("/categories", categories::router())
        .nest("/approvers", approvers::router())
        .nest("/issuances", issuances::router())
        .nest("/requests", requests::router())
}
