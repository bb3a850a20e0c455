//! Management API Handlers

use super::types::*;
use crate::relay::{Direction, RelayEngine, SessionStats};
use axum::{extract::State, http::header, response::IntoResponse, Json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RelayEngine>,
    pub shutting_down: Arc<AtomicBool>,
    pub start_time: SystemTime,
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let shutting_down = state.shutting_down.load(Ordering::Relaxed);
    let status = if shutting_down { "draining" } else { "healthy" };

    Json(ApiResponse::success(HealthStatus {
        status: status.to_string(),
        shutting_down,
    }))
}

/// Get relay status
pub async fn get_relay_status(State(state): State<AppState>) -> Json<ApiResponse<RelayStatus>> {
    let uptime = SystemTime::now()
        .duration_since(state.start_time)
        .unwrap_or_default()
        .as_secs();
    let config = state.engine.config();
    let metrics = state.engine.metrics();

    let status = RelayStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        listen_addr: config.server.bind_addr,
        path: config.server.path.clone(),
        upstream_url: config.upstream.url.clone(),
        active_sessions: state.engine.active_session_count().await,
        total_sessions: metrics.total_sessions(),
        messages_upstream: metrics.messages_forwarded(Direction::Upstream),
        messages_downstream: metrics.messages_forwarded(Direction::Downstream),
        messages_dropped: metrics.messages_dropped(),
        upstream_errors: metrics.upstream_errors(),
    };

    Json(ApiResponse::success(status))
}

/// List active sessions
pub async fn get_sessions(State(state): State<AppState>) -> Json<ApiResponse<Vec<SessionStats>>> {
    Json(ApiResponse::success(state.engine.get_active_session_stats().await))
}

/// Prometheus scrape endpoint
pub async fn export_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.engine.metrics().export_prometheus(),
    )
}
