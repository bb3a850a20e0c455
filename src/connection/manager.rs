//! Connection Manager Implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::Duration;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as HsRequest, Response as HsResponse,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, instrument, warn};

use crate::relay::RelayEngine;
use crate::Result;

/// Accepts client WebSocket connections and hands each one to the relay engine
pub struct ConnectionManager {
    listener: Option<TcpListener>,
    engine: Arc<RelayEngine>,
    shutdown_flag: Arc<AtomicBool>,
}

impl ConnectionManager {
    /// Create a new ConnectionManager
    pub fn new(engine: Arc<RelayEngine>) -> Self {
        Self {
            listener: None,
            engine,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind the listener without starting to accept
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        let bind_addr = self.engine.config().server.bind_addr;

        info!("Binding TCP listener to {}", bind_addr);
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind relay listener to {}", bind_addr))?;

        let local_addr = listener.local_addr()?;
        info!("Successfully bound to {}", local_addr);
        self.listener = Some(listener);
        Ok(local_addr)
    }

    /// Get the bound address, if the listener is up
    pub fn get_bind_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Start accepting connections until `shutdown` fires
    pub async fn start(&mut self, shutdown: broadcast::Receiver<()>) -> Result<()> {
        if self.listener.is_none() {
            self.bind().await?;
        }

        let config = self.engine.config();
        info!(
            "Relay running, clients should connect to ws://{}{}",
            self.get_bind_addr().unwrap_or(config.server.bind_addr),
            config.server.path
        );

        self.accept_connections(shutdown).await
    }

    /// Main connection acceptance loop
    async fn accept_connections(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Listener not initialized"))?;

        info!("Starting connection acceptance loop");

        loop {
            if self.shutdown_flag.load(Ordering::Relaxed) {
                info!("Shutdown flag set, stopping connection acceptance");
                break;
            }

            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            debug!("Accepted connection from {}", addr);

                            if self.shutdown_flag.load(Ordering::Relaxed) {
                                debug!("Rejecting connection from {} due to shutdown", addr);
                                continue;
                            }

                            let engine = Arc::clone(&self.engine);
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, addr, engine).await {
                                    warn!("Error handling connection from {}: {:#}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal, stopping connection acceptance");
                    self.shutdown_flag.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }

        info!("Connection acceptance loop stopped");
        Ok(())
    }

    /// Upgrade one TCP connection on the relay path and run its session
    #[instrument(skip(stream, engine), fields(addr = %addr))]
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        engine: Arc<RelayEngine>,
    ) -> Result<()> {
        let expected_path = engine.config().server.path.clone();

        let callback =
            move |req: &HsRequest, response: HsResponse| -> std::result::Result<HsResponse, ErrorResponse> {
                let path = req.uri().path();
                if path != expected_path {
                    warn!(%addr, %path, "Rejecting upgrade on unknown path");
                    let mut err_response = ErrorResponse::new(Some("Not Found".to_string()));
                    *err_response.status_mut() = StatusCode::NOT_FOUND;
                    return Err(err_response);
                }
                Ok(response)
            };

        let client = accept_hdr_async(stream, callback)
            .await
            .context("WebSocket handshake failed")?;

        info!("Client connected from {}", addr);
        engine.handle_client(client, addr).await;
        Ok(())
    }

    /// Close the listener so new connections are refused
    pub fn initiate_shutdown(&mut self) {
        info!("Initiating connection manager shutdown");
        self.shutdown_flag.store(true, Ordering::Relaxed);
        self.listener = None;
    }

    /// Shared flag that flips once shutdown has begun
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    /// Wait for active sessions to end, bounded by `timeout`
    pub async fn wait_for_sessions_to_close(&self, timeout: Duration) -> Result<()> {
        let start_time = Instant::now();

        let mut last_count = self.engine.active_session_count().await;
        info!(
            "Waiting for {} active sessions to close (timeout: {:?})",
            last_count, timeout
        );

        while last_count > 0 && start_time.elapsed() < timeout {
            tokio::time::sleep(Duration::from_millis(100)).await;

            let current_count = self.engine.active_session_count().await;
            if current_count != last_count {
                debug!("Active sessions: {} -> {}", last_count, current_count);
                last_count = current_count;
            }
        }

        if last_count == 0 {
            info!("All sessions closed in {:?}", start_time.elapsed());
        } else {
            warn!(
                "Shutdown timeout reached after {:?} with {} sessions still active",
                start_time.elapsed(),
                last_count
            );
        }

        Ok(())
    }
}
