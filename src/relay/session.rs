//! Relay Session

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info};

/// Direction of message flow through a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client -> upstream
    Upstream,
    /// Upstream -> client
    Downstream,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and traffic counters of one client/upstream pairing
#[derive(Debug)]
pub struct RelaySession {
    pub session_id: String,
    pub client_addr: SocketAddr,
    pub start_time: Instant,
    pub created_at: SystemTime,
    messages_up: AtomicU64,
    bytes_up: AtomicU64,
    messages_down: AtomicU64,
    bytes_down: AtomicU64,
    messages_dropped: AtomicU64,
}

/// Point-in-time snapshot of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub client_addr: SocketAddr,
    pub created_at: SystemTime,
    pub duration_ms: u64,
    pub messages_up: u64,
    pub bytes_up: u64,
    pub messages_down: u64,
    pub bytes_down: u64,
    pub messages_dropped: u64,
}

impl RelaySession {
    /// Create a new relay session with a fresh id
    pub fn new(client_addr: SocketAddr) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        debug!(%session_id, %client_addr, "Creating new relay session");

        Self {
            session_id,
            client_addr,
            start_time: Instant::now(),
            created_at: SystemTime::now(),
            messages_up: AtomicU64::new(0),
            bytes_up: AtomicU64::new(0),
            messages_down: AtomicU64::new(0),
            bytes_down: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    /// Count one forwarded message
    pub fn record_forwarded(&self, direction: Direction, bytes: usize) {
        let (messages, total) = match direction {
            Direction::Upstream => (&self.messages_up, &self.bytes_up),
            Direction::Downstream => (&self.messages_down, &self.bytes_down),
        };
        messages.fetch_add(1, Ordering::Relaxed);
        total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one message discarded because its destination was not open
    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_up(&self) -> u64 {
        self.messages_up.load(Ordering::Relaxed)
    }

    pub fn messages_down(&self) -> u64 {
        self.messages_down.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Generate session statistics
    pub fn to_stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.session_id.clone(),
            client_addr: self.client_addr,
            created_at: self.created_at,
            duration_ms: self.duration().as_millis() as u64,
            messages_up: self.messages_up(),
            bytes_up: self.bytes_up.load(Ordering::Relaxed),
            messages_down: self.messages_down(),
            bytes_down: self.bytes_down.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped(),
        }
    }

    /// Log session statistics
    pub fn log_stats(&self) {
        let stats = self.to_stats();

        info!(
            session_id = %stats.session_id,
            client_addr = %stats.client_addr,
            duration_ms = stats.duration_ms,
            messages_up = stats.messages_up,
            bytes_up = stats.bytes_up,
            messages_down = stats.messages_down,
            bytes_down = stats.bytes_down,
            messages_dropped = stats.messages_dropped,
            "Relay session completed"
        );
    }
}
