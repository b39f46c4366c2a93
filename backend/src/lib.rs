//! Transfer Manager - Backend Library
//!
//! Stock transfer lifecycle between retail outlets, mirrored onto Lightspeed
//! consignments. The binary in `main.rs` wires configuration, the database
//! pool and the outbox relay around [`create_app`].

use std::sync::Arc;

use axum::{middleware as axum_middleware, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod services;

pub use config::Config;

use external::ConsignmentGateway;
use services::{CsrfTokens, Diagnostics, SyncFlag};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub gateway: Arc<dyn ConsignmentGateway>,
    pub sync: SyncFlag,
    pub diagnostics: Diagnostics,
    pub csrf: CsrfTokens,
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::api_routes(state.clone()))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::diagnostics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
