//! Metrics Collector

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::time::Duration;
use tracing::error;

use crate::relay::Direction;

/// Relay counters exported in Prometheus text format
pub struct Metrics {
    registry: Registry,
    sessions_total: IntCounter,
    active_sessions: IntGauge,
    session_duration: Histogram,
    messages_forwarded: IntCounterVec,
    bytes_forwarded: IntCounterVec,
    messages_dropped: IntCounter,
    upstream_errors: IntCounter,
}

impl Metrics {
    /// Create and register all relay metrics
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let sessions_total = IntCounter::new(
            "relay_sessions_total",
            "Total number of relay sessions accepted",
        )?;
        let active_sessions = IntGauge::new(
            "relay_active_sessions",
            "Number of currently active relay sessions",
        )?;
        let session_duration = Histogram::with_opts(
            HistogramOpts::new(
                "relay_session_duration_seconds",
                "Duration of relay sessions in seconds",
            )
            .buckets(vec![1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        )?;
        let messages_forwarded = IntCounterVec::new(
            Opts::new("relay_messages_forwarded_total", "Messages forwarded per direction"),
            &["direction"],
        )?;
        let bytes_forwarded = IntCounterVec::new(
            Opts::new("relay_bytes_forwarded_total", "Payload bytes forwarded per direction"),
            &["direction"],
        )?;
        let messages_dropped = IntCounter::new(
            "relay_messages_dropped_total",
            "Client messages dropped because the upstream was not open",
        )?;
        let upstream_errors = IntCounter::new(
            "relay_upstream_errors_total",
            "Upstream connect or transport failures",
        )?;

        registry.register(Box::new(sessions_total.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;
        registry.register(Box::new(session_duration.clone()))?;
        registry.register(Box::new(messages_forwarded.clone()))?;
        registry.register(Box::new(bytes_forwarded.clone()))?;
        registry.register(Box::new(messages_dropped.clone()))?;
        registry.register(Box::new(upstream_errors.clone()))?;

        Ok(Self {
            registry,
            sessions_total,
            active_sessions,
            session_duration,
            messages_forwarded,
            bytes_forwarded,
            messages_dropped,
            upstream_errors,
        })
    }

    pub fn session_started(&self) {
        self.sessions_total.inc();
        self.active_sessions.inc();
    }

    pub fn session_ended(&self, duration: Duration) {
        self.active_sessions.dec();
        self.session_duration.observe(duration.as_secs_f64());
    }

    pub fn message_forwarded(&self, direction: Direction, bytes: usize) {
        self.messages_forwarded
            .with_label_values(&[direction.as_str()])
            .inc();
        self.bytes_forwarded
            .with_label_values(&[direction.as_str()])
            .inc_by(bytes as u64);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.inc();
    }

    pub fn upstream_error(&self) {
        self.upstream_errors.inc();
    }

    pub fn total_sessions(&self) -> u64 {
        self.sessions_total.get()
    }

    pub fn active_sessions(&self) -> i64 {
        self.active_sessions.get()
    }

    pub fn messages_forwarded(&self, direction: Direction) -> u64 {
        self.messages_forwarded
            .with_label_values(&[direction.as_str()])
            .get()
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.get()
    }

    pub fn upstream_errors(&self) -> u64 {
        self.upstream_errors.get()
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_gauge_tracks_lifecycle() {
        let metrics = Metrics::new().unwrap();

        metrics.session_started();
        metrics.session_started();
        assert_eq!(metrics.total_sessions(), 2);
        assert_eq!(metrics.active_sessions(), 2);

        metrics.session_ended(Duration::from_secs(3));
        assert_eq!(metrics.total_sessions(), 2);
        assert_eq!(metrics.active_sessions(), 1);
    }

    #[test]
    fn test_forwarded_counters_are_per_direction() {
        let metrics = Metrics::new().unwrap();

        metrics.message_forwarded(Direction::Upstream, 10);
        metrics.message_forwarded(Direction::Upstream, 5);
        metrics.message_forwarded(Direction::Downstream, 7);
        metrics.message_dropped();

        assert_eq!(metrics.messages_forwarded(Direction::Upstream), 2);
        assert_eq!(metrics.messages_forwarded(Direction::Downstream), 1);
        assert_eq!(metrics.messages_dropped(), 1);
    }

    #[test]
    fn test_export_prometheus() {
        let metrics = Metrics::new().unwrap();
        metrics.session_started();
        metrics.upstream_error();

        let output = metrics.export_prometheus();
        assert!(output.contains("relay_sessions_total 1"));
        assert!(output.contains("relay_upstream_errors_total 1"));
    }
}
