//! Management API Server

use super::{api::ManagementApi, handlers::AppState};
use crate::{relay::RelayEngine, Result};
use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Management API server
pub struct ManagementServer {
    bind_addr: SocketAddr,
    app_state: AppState,
}

impl ManagementServer {
    /// Create a new management server
    pub fn new(
        bind_addr: SocketAddr,
        engine: Arc<RelayEngine>,
        shutting_down: Arc<AtomicBool>,
    ) -> Self {
        let app_state = AppState {
            engine,
            shutting_down,
            start_time: SystemTime::now(),
        };

        Self {
            bind_addr,
            app_state,
        }
    }

    /// Start the management API server
    pub async fn start(self) -> Result<()> {
        let app = ManagementApi::create_router(self.app_state);

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind management API server to {}", self.bind_addr))?;

        info!("Management API server listening on {}", self.bind_addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("Management API server error: {}", e);
            return Err(e.into());
        }

        Ok(())
    }

    /// Create a router for testing
    pub fn create_test_router(&self) -> Router {
        ManagementApi::create_router(self.app_state.clone())
    }
}
