//! Management API Module
//!
//! Optional read-only HTTP API exposing relay health, status, and metrics.

pub mod api;
pub mod handlers;
pub mod server;
pub mod types;

pub use api::ManagementApi;
pub use server::ManagementServer;
pub use types::*;
