//! Metrics Module
//!
//! Prometheus counters for sessions and relayed traffic.

pub mod collector;

pub use collector::Metrics;
