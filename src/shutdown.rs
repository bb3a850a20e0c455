//! Graceful Shutdown Handling
//!
//! Listens for SIGTERM/SIGINT (Ctrl+C on Windows) and broadcasts a single
//! shutdown signal to every subscribed component.

use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::Result;

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            timeout,
        }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// How long active sessions may take to drain
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Broadcast the shutdown signal without waiting for an OS signal.
    /// Returns how many subscribers were notified.
    pub fn trigger(&self) -> usize {
        match self.shutdown_tx.send(()) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("Shutdown signal sent with no active subscribers");
                0
            }
        }
    }

    /// Wait for SIGTERM or SIGINT, then broadcast shutdown
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        let notified = self.trigger();
        debug!("Shutdown signal delivered to {} subscribers", notified);
        Ok(())
    }
}
