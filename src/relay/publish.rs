//! Publication of decoded messages under backpressure.

use tokio::{
    sync::mpsc::{
        self,
        error::{SendTimeoutError, TrySendError},
    },
    time::{Duration, Instant},
};
use tracing::warn;

use crate::{config::BackpressurePolicy, metrics::Direction, protocol::ProtocolMessage};

/// Minimum spacing between two "channel full" warnings of one publisher.
const DROP_WARN_INTERVAL: Duration = Duration::from_secs(1);

enum Rejected {
    Full,
    Closed,
}

/// Sending half of a session channel together with its backpressure policy.
///
/// Publication never fails from the caller's point of view: a full channel
/// drops the message (counted and warned about at most once per second), and
/// a closed channel silently disables further publication.
#[derive(Debug)]
pub struct Publisher {
    tx: mpsc::Sender<ProtocolMessage>,
    policy: BackpressurePolicy,
    direction: Direction,
    closed: bool,
    dropped: u64,
    last_warning: Option<Instant>,
}

impl Publisher {
    /// Create a publisher sending on `tx` for frames travelling `direction`.
    #[must_use]
    pub fn new(
        tx: mpsc::Sender<ProtocolMessage>,
        policy: BackpressurePolicy,
        direction: Direction,
    ) -> Self {
        Self {
            tx,
            policy,
            direction,
            closed: false,
            dropped: 0,
            last_warning: None,
        }
    }

    /// Number of messages dropped because the channel was full.
    #[must_use]
    pub fn dropped(&self) -> u64 { self.dropped }

    /// Returns `true` once the receiving engine has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed }

    /// Offer `message` to the correlation engine.
    pub async fn publish(&mut self, message: ProtocolMessage) {
        if self.closed {
            return;
        }
        let outcome = match self.policy {
            BackpressurePolicy::DropNewest => self.tx.try_send(message).map_err(|e| match e {
                TrySendError::Full(_) => Rejected::Full,
                TrySendError::Closed(_) => Rejected::Closed,
            }),
            BackpressurePolicy::BlockWithTimeout(limit) => self
                .tx
                .send_timeout(message, limit)
                .await
                .map_err(|e| match e {
                    SendTimeoutError::Timeout(_) => Rejected::Full,
                    SendTimeoutError::Closed(_) => Rejected::Closed,
                }),
        };
        match outcome {
            Ok(()) => {}
            Err(Rejected::Full) => self.record_drop(),
            Err(Rejected::Closed) => self.closed = true,
        }
    }

    fn record_drop(&mut self) {
        self.dropped += 1;
        crate::metrics::inc_messages_dropped(self.direction);
        let now = Instant::now();
        if self
            .last_warning
            .is_none_or(|last| now.duration_since(last) >= DROP_WARN_INTERVAL)
        {
            self.last_warning = Some(now);
            warn!(
                direction = self.direction.as_str(),
                dropped = self.dropped,
                "session channel full, dropping decoded messages"
            );
        }
    }
}
