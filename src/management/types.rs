//! Management API Types

use serde::Serialize;
use std::net::SocketAddr;
use std::time::SystemTime;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: SystemTime::now(),
        }
    }
}

/// Health check result
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub shutting_down: bool,
}

/// Relay status information
#[derive(Debug, Serialize)]
pub struct RelayStatus {
    pub version: String,
    pub uptime_seconds: u64,
    pub listen_addr: SocketAddr,
    pub path: String,
    pub upstream_url: String,
    pub active_sessions: usize,
    pub total_sessions: u64,
    pub messages_upstream: u64,
    pub messages_downstream: u64,
    pub messages_dropped: u64,
    pub upstream_errors: u64,
}
