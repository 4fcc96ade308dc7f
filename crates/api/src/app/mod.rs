//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: the store handle, engines, queries and the realtime channel
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request bodies and id parsing
//! - `errors.rs`: consistent JSON error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router over already-wired services.
pub fn build_app(services: Arc<AppServices>, jwt_secret: impl Into<Vec<u8>>) -> Router {
    let jwt = Arc::new(storekeep_auth::Hs256JwtValidator::new(jwt_secret.into()));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require a valid bearer token.
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(
                auth_state,
                middleware::auth_middleware,
            ))
            .layer(Extension(services)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
