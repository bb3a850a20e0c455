//! Connection Management Module
//!
//! Handles the inbound listener, the WebSocket upgrade, and session spawning.

pub mod manager;

pub use manager::ConnectionManager;
