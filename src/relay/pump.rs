//! Single-direction relay loop.

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::debug;
use tokio::{
    select,
    time::{Duration, timeout},
};
use tokio_util::sync::CancellationToken;

use super::{Frame, Publisher, PumpExit, TransportError};
use crate::{metrics::Direction, protocol::ProtocolMessage};

/// Time allowed for closing the outbound leg once the pump stops.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Copies frames from `inbound` to `outbound` for one direction of a session.
///
/// Frames are forwarded byte for byte and in order. Each data frame is also
/// decoded best-effort and, if that succeeds, handed to the [`Publisher`];
/// decode failures and dropped publications never affect forwarding.
pub struct RelayPump<R, W> {
    direction: Direction,
    inbound: R,
    outbound: W,
    publisher: Publisher,
    token: CancellationToken,
}

impl<R, W> RelayPump<R, W>
where
    R: Stream<Item = Result<Frame, TransportError>> + Unpin,
    W: Sink<Frame, Error = TransportError> + Unpin,
{
    /// Create a pump for `direction`.
    ///
    /// `token` is shared by every task of the session: the pump stops when it
    /// fires and fires it when the pump stops for any other reason.
    pub fn new(
        direction: Direction,
        inbound: R,
        outbound: W,
        publisher: Publisher,
        token: CancellationToken,
    ) -> Self {
        Self {
            direction,
            inbound,
            outbound,
            publisher,
            token,
        }
    }

    /// Relay until either leg fails, the inbound leg closes, or the session
    /// is cancelled.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run(mut self) -> PumpExit {
        let exit = loop {
            let frame = select! {
                biased;

                () = self.token.cancelled() => break PumpExit::Cancelled,
                next = self.inbound.next() => match next {
                    Some(Ok(frame)) => frame,
                    Some(Err(error)) => break PumpExit::ReadFailed(error),
                    None => break PumpExit::Closed,
                },
            };

            if let Some(payload) = frame.payload() {
                self.observe(payload.clone()).await;
            }
            let closing = frame.is_close();

            select! {
                biased;

                () = self.token.cancelled() => break PumpExit::Cancelled,
                sent = self.outbound.send(frame) => {
                    if let Err(error) = sent {
                        break PumpExit::WriteFailed(error);
                    }
                }
            }
            crate::metrics::inc_frames(self.direction);
            if closing {
                break PumpExit::Closed;
            }
        };

        self.token.cancel();
        if !matches!(exit, PumpExit::WriteFailed(_)) {
            match timeout(CLOSE_GRACE, self.outbound.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => debug!(
                    "closing outbound leg failed: direction={}, error={error}",
                    self.direction.as_str()
                ),
                Err(_) => debug!(
                    "closing outbound leg timed out: direction={}",
                    self.direction.as_str()
                ),
            }
        }
        debug!(
            "relay pump stopped: direction={}, exit={exit}, dropped={}",
            self.direction.as_str(),
            self.publisher.dropped()
        );
        exit
    }

    async fn observe(&mut self, payload: Bytes) {
        match ProtocolMessage::decode(payload) {
            Ok(message) => self.publisher.publish(message).await,
            Err(error) => {
                crate::metrics::inc_decode_errors();
                debug!(
                    "frame relayed without correlation: direction={}, error={error}",
                    self.direction.as_str()
                );
            }
        }
    }
}
