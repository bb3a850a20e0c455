//! Realtime Relay Library
//!
//! A WebSocket relay that pairs each client connection with its own
//! connection to the OpenAI Realtime API, injecting the server-held bearer
//! token, and copies frames verbatim in both directions.

pub mod config;
pub mod connection;
pub mod management;
pub mod metrics;
pub mod protocol;
pub mod relay;
pub mod shutdown;

pub use config::Config;
pub use connection::ConnectionManager;
pub use relay::RelayEngine;
pub use shutdown::ShutdownCoordinator;

/// Common error type for the relay
pub type Result<T> = anyhow::Result<T>;
