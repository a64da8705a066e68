//! Tests for the relay pump and publisher.

use bytes::Bytes;
use futures::{
    SinkExt,
    StreamExt,
    channel::mpsc as leg,
    stream,
};
use rstest::{fixture, rstest};
use tokio::{
    sync::mpsc,
    time::{Duration, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use super::*;
use crate::{config::BackpressurePolicy, metrics::Direction, protocol::ProtocolMessage};

type Inbound = leg::UnboundedSender<Result<Frame, TransportError>>;

struct Harness {
    inbound: Inbound,
    outbound: leg::UnboundedReceiver<Frame>,
    messages: mpsc::Receiver<ProtocolMessage>,
    token: CancellationToken,
    pump: tokio::task::JoinHandle<PumpExit>,
}

fn spawn_pump(capacity: usize, policy: BackpressurePolicy) -> Harness {
    let (inbound_tx, inbound_rx) = leg::unbounded();
    let (outbound_tx, outbound_rx) = leg::unbounded();
    let (tx, messages) = mpsc::channel(capacity);
    let token = CancellationToken::new();
    let pump = RelayPump::new(
        Direction::ClientToUpstream,
        inbound_rx,
        outbound_tx.sink_map_err(|_| TransportError::Disconnected),
        Publisher::new(tx, policy, Direction::ClientToUpstream),
        token.clone(),
    );
    Harness {
        inbound: inbound_tx,
        outbound: outbound_rx,
        messages,
        token,
        pump: tokio::spawn(pump.run()),
    }
}

#[fixture]
fn harness() -> Harness { spawn_pump(16, BackpressurePolicy::default()) }

fn request(id: u64) -> Frame { Frame::text(format!(r#"{{"id":{id},"method":"Page.enable"}}"#)) }

#[rstest]
#[tokio::test]
async fn forwards_frames_verbatim_and_publishes_decoded(mut harness: Harness) {
    let frames = [
        request(1),
        Frame::text("not json"),
        Frame::Binary(Bytes::from_static(br#"{"method":"Page.loadEventFired"}"#)),
    ];
    for frame in &frames {
        harness.inbound.unbounded_send(Ok(frame.clone())).expect("feed frame");
    }
    for expected in &frames {
        let relayed = harness.outbound.next().await.expect("relayed frame");
        assert_eq!(&relayed, expected);
    }

    let first = harness.messages.recv().await.expect("first message");
    assert_eq!(first.id(), 1);
    let second = harness.messages.recv().await.expect("second message");
    assert_eq!(second.method(), "Page.loadEventFired");
    assert!(harness.messages.try_recv().is_err(), "undecodable frame was published");

    harness.token.cancel();
    let exit = harness.pump.await.expect("join pump");
    assert!(matches!(exit, PumpExit::Cancelled));
}

#[rstest]
#[tokio::test]
async fn close_frame_is_forwarded_then_ends_session(mut harness: Harness) {
    let close = Frame::Close(Some(CloseReason {
        code: 1000,
        reason: "done".into(),
    }));
    harness.inbound.unbounded_send(Ok(close.clone())).expect("feed close");

    let exit = harness.pump.await.expect("join pump");
    assert!(matches!(exit, PumpExit::Closed));
    assert_eq!(harness.outbound.next().await, Some(close));
    assert!(harness.token.is_cancelled());
}

#[rstest]
#[tokio::test]
async fn read_failure_cancels_the_session(harness: Harness) {
    harness
        .inbound
        .unbounded_send(Err(TransportError::Disconnected))
        .expect("feed error");
    let exit = harness.pump.await.expect("join pump");
    assert!(matches!(exit, PumpExit::ReadFailed(TransportError::Disconnected)));
    assert!(harness.token.is_cancelled());
}

#[rstest]
#[tokio::test]
async fn write_failure_cancels_the_session(harness: Harness) {
    let Harness {
        inbound,
        outbound,
        token,
        pump,
        ..
    } = harness;
    drop(outbound);
    inbound.unbounded_send(Ok(request(1))).expect("feed frame");
    let exit = pump.await.expect("join pump");
    assert!(exit.is_failure());
    assert!(matches!(exit, PumpExit::WriteFailed(_)));
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn inbound_end_closes_the_pump() {
    let (outbound_tx, _outbound_rx) = leg::unbounded();
    let (tx, _rx) = mpsc::channel(1);
    let token = CancellationToken::new();
    let exit = RelayPump::new(
        Direction::UpstreamToClient,
        stream::iter(vec![Ok(request(1))]),
        outbound_tx.sink_map_err(|_| TransportError::Disconnected),
        Publisher::new(tx, BackpressurePolicy::DropNewest, Direction::UpstreamToClient),
        token.clone(),
    )
    .run()
    .await;
    assert!(matches!(exit, PumpExit::Closed));
    assert!(token.is_cancelled());
}

#[traced_test]
#[tokio::test]
async fn drop_newest_keeps_forwarding_when_channel_is_full() {
    let mut harness = spawn_pump(1, BackpressurePolicy::DropNewest);
    for id in 1..=5 {
        harness.inbound.unbounded_send(Ok(request(id))).expect("feed frame");
    }
    for id in 1..=5 {
        let relayed = harness.outbound.next().await.expect("relayed frame");
        assert_eq!(relayed, request(id));
    }

    let kept = harness.messages.recv().await.expect("one message fits");
    assert_eq!(kept.id(), 1);
    assert!(harness.messages.try_recv().is_err());
    assert!(logs_contain("session channel full"));

    harness.token.cancel();
    harness.pump.await.expect("join pump");
}

#[tokio::test(start_paused = true)]
async fn block_with_timeout_waits_for_capacity() {
    let mut harness = spawn_pump(
        1,
        BackpressurePolicy::BlockWithTimeout(Duration::from_millis(100)),
    );
    harness.inbound.unbounded_send(Ok(request(1))).expect("feed frame");
    harness.inbound.unbounded_send(Ok(request(2))).expect("feed frame");
    assert_eq!(harness.outbound.next().await, Some(request(1)));

    // The second publication waits for room; draining the first makes it.
    let first = harness.messages.recv().await.expect("first message");
    assert_eq!(first.id(), 1);
    let second = timeout(Duration::from_millis(50), harness.messages.recv())
        .await
        .expect("second message within the timeout")
        .expect("second message");
    assert_eq!(second.id(), 2);
    assert_eq!(harness.outbound.next().await, Some(request(2)));

    harness.token.cancel();
    harness.pump.await.expect("join pump");
}

#[tokio::test(start_paused = true)]
async fn publisher_drops_after_timeout_and_counts() {
    let (tx, mut rx) = mpsc::channel(1);
    let mut publisher = Publisher::new(
        tx,
        BackpressurePolicy::BlockWithTimeout(Duration::from_millis(100)),
        Direction::UpstreamToClient,
    );
    let message = |id: u64| {
        ProtocolMessage::decode(format!(r#"{{"id":{id},"result":{{}}}}"#)).expect("decode")
    };
    publisher.publish(message(1)).await;
    publisher.publish(message(2)).await;
    assert_eq!(publisher.dropped(), 1);
    assert_eq!(rx.recv().await.map(|m| m.id()), Some(1));

    drop(rx);
    publisher.publish(message(3)).await;
    assert!(publisher.is_closed());
    assert_eq!(publisher.dropped(), 1);
}
