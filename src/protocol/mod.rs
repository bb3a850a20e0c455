//! Realtime Protocol Support
//!
//! Wire constants and the best-effort event decoding used for diagnostics.
//! Nothing in here is allowed to change the bytes the relay forwards.

pub mod constants;
pub mod types;

pub use constants::*;
pub use types::*;
