use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// API Routes - REST API for programmatic access
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            .route("/health", get(handlers::api::health))
            .route("/status", get(handlers::api::system_status))
            .route("/query", post(handlers::api::process_query))
            .route("/schema", get(handlers::api::get_schema)),
    )
}
