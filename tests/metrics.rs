#![cfg(feature = "metrics")]
//! Tests for `devtools_proxy` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use devtools_proxy::metrics::{self as proxy_metrics, Direction};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

#[rstest]
#[case(Direction::ClientToUpstream, "client_to_upstream")]
#[case(Direction::UpstreamToClient, "upstream_to_client")]
fn relayed_frames_are_counted_per_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        proxy_metrics::inc_frames(direction);
        proxy_metrics::inc_frames(direction);
    });

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(k, _, _, v)| {
        k.key().name() == proxy_metrics::FRAMES_RELAYED
            && k.key()
                .labels()
                .any(|l| l.key() == "direction" && l.value() == label)
            && matches!(v, DebugValue::Counter(2))
    });
    assert!(found, "{label} frames metric not recorded: {metrics:#?}");
}

#[test]
fn dropped_messages_carry_their_direction() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        proxy_metrics::inc_messages_dropped(Direction::UpstreamToClient);
    });

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(k, _, _, v)| {
        k.key().name() == proxy_metrics::MESSAGES_DROPPED
            && k.key()
                .labels()
                .any(|l| l.key() == "direction" && l.value() == "upstream_to_client")
            && matches!(v, DebugValue::Counter(1))
    });
    assert!(found, "dropped messages metric not recorded");
}

#[test]
fn session_gauge_tracks_open_sessions() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        proxy_metrics::inc_sessions();
        proxy_metrics::inc_sessions();
        proxy_metrics::dec_sessions();
    });

    let metrics = snapshotter.snapshot().into_vec();
    let found = metrics.iter().any(|(k, _, _, v)| {
        k.key().name() == proxy_metrics::SESSIONS_ACTIVE
            && matches!(v, DebugValue::Gauge(g) if (g.into_inner() - 1.0).abs() < f64::EPSILON)
    });
    assert!(found, "active sessions gauge not recorded: {metrics:#?}");
}

#[rstest]
#[case(proxy_metrics::DECODE_ERRORS, proxy_metrics::inc_decode_errors as fn())]
#[case(proxy_metrics::CORRELATION_MISSES, proxy_metrics::inc_correlation_misses as fn())]
#[case(proxy_metrics::CONNECTION_PANICS, proxy_metrics::inc_connection_panics as fn())]
fn error_counters_increment(#[case] name: &str, #[case] increment: fn()) {
    // Arrange
    let (snapshotter, recorder) = debugging_recorder_setup();

    // Act
    metrics::with_local_recorder(&recorder, || {
        increment();
        increment();
    });

    // Assert
    assert_counter_eq(&snapshotter, name, 2);
}

fn assert_counter_eq(snapshotter: &Snapshotter, name: &str, expected: u64) {
    let metrics = snapshotter.snapshot().into_vec();
    assert!(
        metrics.iter().any(|(key, _, _, value)| {
            key.key().name() == name && matches!(value, DebugValue::Counter(c) if *c == expected)
        }),
        "expected {name} == {expected}, got {metrics:#?}"
    );
}
