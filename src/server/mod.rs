//! The HTTP boundary: routing and shared state.

pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/generate", post(handlers::generate))
        .route("/v1/status", get(handlers::status))
        .route("/v1/trends", get(handlers::trends))
        .route("/v1/export/hardware", post(handlers::export_hardware))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
