//! Metric helpers for `devtools_proxy`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking active sessions.
pub const SESSIONS_ACTIVE: &str = "devtools_proxy_sessions_active";
/// Name of the counter tracking relayed frames.
pub const FRAMES_RELAYED: &str = "devtools_proxy_frames_relayed_total";
/// Name of the counter tracking frames that failed to decode.
pub const DECODE_ERRORS: &str = "devtools_proxy_decode_errors_total";
/// Name of the counter tracking responses with no pending request.
pub const CORRELATION_MISSES: &str = "devtools_proxy_correlation_misses_total";
/// Name of the counter tracking messages dropped under backpressure.
pub const MESSAGES_DROPPED: &str = "devtools_proxy_messages_dropped_total";
/// Name of the counter tracking panicking connection tasks.
pub const CONNECTION_PANICS: &str = "devtools_proxy_connection_panics_total";

/// Direction a frame travels through the proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// From the debugging client to the debuggee.
    ClientToUpstream,
    /// From the debuggee back to the client.
    UpstreamToClient,
}

impl Direction {
    /// Label value used for this direction.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::ClientToUpstream => "client_to_upstream",
            Direction::UpstreamToClient => "upstream_to_client",
        }
    }
}

/// Increment the active sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the active sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a relayed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_RELAYED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a frame that could not be decoded.
pub fn inc_decode_errors() {
    #[cfg(feature = "metrics")]
    counter!(DECODE_ERRORS).increment(1);
}

/// Record a response that matched no pending request.
pub fn inc_correlation_misses() {
    #[cfg(feature = "metrics")]
    counter!(CORRELATION_MISSES).increment(1);
}

/// Record a message dropped before reaching the correlation engine.
pub fn inc_messages_dropped(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_DROPPED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a connection task that panicked.
pub fn inc_connection_panics() {
    #[cfg(feature = "metrics")]
    counter!(CONNECTION_PANICS).increment(1);
}
