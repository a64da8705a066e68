//! Retry delays for failing `accept()` calls.

use std::time::Duration;

const MIN_DELAY: Duration = Duration::from_millis(1);

/// Exponential back-off applied when the listener fails to accept.
///
/// The first retry waits `initial_delay`; each further consecutive failure
/// doubles the wait up to `max_delay`. A successful accept starts over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Wait before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the wait.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Clamp both delays to at least one millisecond and order them.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use devtools_proxy::server::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::ZERO,
    ///     max_delay: Duration::from_millis(5),
    /// }
    /// .normalized();
    /// assert_eq!(cfg.initial_delay, Duration::from_millis(1));
    /// assert_eq!(cfg.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(self) -> Self {
        let a = self.initial_delay.max(MIN_DELAY);
        let b = self.max_delay.max(MIN_DELAY);
        Self {
            initial_delay: a.min(b),
            max_delay: a.max(b),
        }
    }
}

/// Running back-off state of one accept loop.
#[derive(Debug)]
pub(super) struct Backoff {
    config: BackoffConfig,
    next: Duration,
}

impl Backoff {
    pub(super) fn new(config: BackoffConfig) -> Self {
        let config = config.normalized();
        Self {
            config,
            next: config.initial_delay,
        }
    }

    /// Delay to wait now; the following call waits twice as long.
    pub(super) fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (delay * 2).min(self.config.max_delay);
        delay
    }

    pub(super) fn reset(&mut self) { self.next = self.config.initial_delay; }
}
