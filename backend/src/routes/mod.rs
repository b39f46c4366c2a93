//! Route definitions for the Transfer Manager

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Action endpoints (protected)
        .merge(action_routes(state))
}

/// Both action endpoints share one dispatcher; anything but POST is a 405
fn action_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/backend.php",
            post(handlers::legacy_dispatch).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/v1/transfers",
            post(handlers::dispatch).fallback(handlers::method_not_allowed),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
