//! Proxy configuration.
//!
//! A [`ProxyConfig`] is built once at startup (normally from the command
//! line), validated, and then shared read-only by every session behind an
//! `Arc`.

use std::time::Duration;

use static_assertions::const_assert;
use thiserror::Error;

use crate::{filter::Filter, server::BackoffConfig};

/// Default capacity of the per-session message channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
/// Default wait for channel capacity before a message is dropped.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_millis(100);
/// Outstanding requests per channel above which a warning is logged.
pub const DEFAULT_PENDING_WARN_THRESHOLD: usize = 10_000;
/// Default limit for reading the upgrade request head.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default limit for the upstream version check and dial.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

const_assert!(DEFAULT_CHANNEL_CAPACITY > 0);
const_assert!(DEFAULT_PENDING_WARN_THRESHOLD > DEFAULT_CHANNEL_CAPACITY);

/// Behaviour of a relay pump when the session channel is full.
///
/// Frame forwarding is never affected; only publication to the correlation
/// engine is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Wait up to the given duration for capacity, then drop the message.
    BlockWithTimeout(Duration),
    /// Drop the message immediately.
    DropNewest,
}

impl Default for BackpressurePolicy {
    fn default() -> Self { Self::BlockWithTimeout(DEFAULT_PUBLISH_TIMEOUT) }
}

/// Errors reported by [`ProxyConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The session channel must hold at least one message.
    #[error("channel capacity must be at least 1")]
    ZeroChannelCapacity,
    /// An address is not of the form `host:port`.
    #[error("invalid {field} address `{value}`: expected host:port")]
    InvalidAddress {
        /// Which setting carried the address.
        field: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Immutable configuration snapshot shared by all sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Address the proxy listens on.
    pub listen: String,
    /// Address of the debuggee's remote-debugging endpoint.
    pub remote: String,
    /// Substrings a record must contain to be emitted.
    pub include: Vec<String>,
    /// Substrings that suppress a record.
    pub exclude: Vec<String>,
    /// Emit requests as soon as they are seen, not only once paired.
    pub show_requests: bool,
    /// Give each sub-session its own named sink.
    pub distribute_logs: bool,
    /// Maximum rendered payload length in bytes; zero disables truncation.
    pub truncate_len: usize,
    /// Capacity of the per-session message channel.
    pub channel_capacity: usize,
    /// What a pump does when the channel is full.
    pub backpressure: BackpressurePolicy,
    /// Stop accepting after the first session ends.
    pub once: bool,
    /// Limit for reading the inbound upgrade request.
    pub handshake_timeout: Duration,
    /// Limit for the upstream version check and for the upstream dial.
    pub upstream_timeout: Duration,
    /// Outstanding requests per channel above which a warning is logged.
    pub pending_warn_threshold: usize,
    /// Back-off applied when accepting a connection fails.
    pub backoff: BackoffConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: "localhost:9223".to_owned(),
            remote: "localhost:9222".to_owned(),
            include: Vec::new(),
            exclude: Vec::new(),
            show_requests: false,
            distribute_logs: false,
            truncate_len: 0,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure: BackpressurePolicy::default(),
            once: false,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            pending_warn_threshold: DEFAULT_PENDING_WARN_THRESHOLD,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Check the settings that cannot be enforced by their types.
    ///
    /// Address resolution happens when the listener is bound and when the
    /// upstream is dialled; only the `host:port` shape is checked here.
    ///
    /// ```
    /// use devtools_proxy::config::{ConfigError, ProxyConfig};
    ///
    /// let config = ProxyConfig {
    ///     channel_capacity: 0,
    ///     ..ProxyConfig::default()
    /// };
    /// assert_eq!(config.validate(), Err(ConfigError::ZeroChannelCapacity));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }
        check_address("listen", &self.listen)?;
        check_address("remote", &self.remote)?;
        Ok(())
    }

    /// Filter built from the include and exclude patterns.
    #[must_use]
    pub fn filter(&self) -> Filter { Filter::new(self.include.clone(), self.exclude.clone()) }
}

fn check_address(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let valid = value
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidAddress {
            field,
            value: value.to_owned(),
        })
    }
}
