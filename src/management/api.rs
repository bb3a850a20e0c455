//! Management API Routes

use super::handlers::*;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

/// Management API router
pub struct ManagementApi;

impl ManagementApi {
    /// Create the management API router
    pub fn create_router(state: AppState) -> Router {
        let api_routes = Router::new()
            .route("/health", get(health_check))
            .route("/status", get(get_relay_status))
            .route("/sessions", get(get_sessions));

        Router::new()
            .nest("/api/v1", api_routes)
            .route("/metrics", get(export_metrics))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }
}
