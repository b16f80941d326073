//! HomeLink Shared Protocol Types
//!
//! This crate provides the envelope types, topic scheme, and wire codec
//! used between HomeLink device agents and the broker bridge.

pub mod codec;
pub mod envelope;
pub mod topic;
pub mod wire;

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Get current timestamp in whole seconds since Unix epoch
pub fn now_secs() -> u64 {
    now_ms() / 1000
}

/// Timing parameters for the agent
pub mod timing {
    /// Heartbeat publish interval in milliseconds
    pub const HEARTBEAT_INTERVAL_MS: u64 = 10_000;

    /// Execution budget for a single command handler
    pub const HANDLER_BUDGET_MS: u64 = 30_000;

    /// Bound on a single outbound publish before it is reported as failed
    pub const PUBLISH_TIMEOUT_MS: u64 = 5_000;

    /// Initial reconnect delay after losing the bridge connection
    pub const RECONNECT_DELAY_MS: u64 = 1_000;

    /// Ceiling for the exponential reconnect backoff
    pub const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

    /// Bridge connect timeout in milliseconds
    pub const CONNECT_TIMEOUT_MS: u64 = 5_000;

    /// Maximum command handlers executing concurrently
    pub const MAX_IN_FLIGHT: usize = 4;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_secs_tracks_now_ms() {
        let secs = now_secs();
        let ms = now_ms();
        assert!(ms / 1000 >= secs);
        assert!(ms / 1000 - secs <= 1);
    }
}
