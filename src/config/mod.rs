//! Configuration Module
//!
//! Handles configuration loading, validation, and CLI/environment overrides.
//! The resulting `Config` is built once at startup and shared read-only.

pub mod manager;
pub mod types;

pub use manager::ConfigManager;
pub use types::*;
