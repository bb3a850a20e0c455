//! Relay Module
//!
//! Pairs every client connection with one upstream connection and copies
//! frames between them until either side goes away.

pub mod engine;
pub mod peer;
pub mod session;

pub use engine::{build_upstream_request, RelayEngine};
pub use peer::{Peer, PeerRole, PeerState, RelayStream};
pub use session::{Direction, RelaySession, SessionStats};
