//! Connection handling for [`ProxyServer`](super::ProxyServer).
//!
//! Each accepted socket runs in its own tracked task. `hyper` serves the
//! HTTP exchange through the [inbound router](super::inbound); once the
//! router has upgraded a client, the session runs on this same task so
//! shutdown and panic isolation cover it.

use std::{net::SocketAddr, sync::Arc};

use futures::FutureExt;
use hyper::server::conn::http1;
use hyper_util::{
    rt::{TokioIo, TokioTimer},
    service::TowerToHyperService,
};
use log::{debug, error, warn};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{
    error::HandshakeError,
    inbound::{Accepted, Inbound, router},
};
use crate::{
    config::ProxyConfig,
    relay::{client_leg, websocket_leg},
    session::run_session,
    sink::SinkRegistry,
};

/// Largest request head accepted from a client.
pub const MAX_REQUEST_HEAD: usize = 16 * 1024;

/// Everything a connection task needs besides its socket.
pub(in crate::server) struct ConnectionEnv {
    pub config: Arc<ProxyConfig>,
    pub registry: Arc<SinkRegistry>,
    pub http: reqwest::Client,
}

/// Spawn a task to process a single TCP connection, logging and discarding
/// any panics.
pub(super) fn spawn_connection_task(
    stream: TcpStream,
    env: Arc<ConnectionEnv>,
    token: CancellationToken,
    tracker: &TaskTracker,
) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!("Failed to retrieve peer address: error={e}");
            None
        }
    };
    tracker.spawn(async move {
        let fut = std::panic::AssertUnwindSafe(process_stream(stream, peer_addr, env, token))
            .catch_unwind();

        if let Err(panic) = fut.await {
            crate::metrics::inc_connection_panics();
            let panic_msg = crate::panic::panic_text(&*panic);
            // Emit via both `log` and `tracing` for tests that capture either.
            error!("connection task panicked: panic={panic_msg}, peer_addr={peer_addr:?}");
            tracing::error!(panic = %panic_msg, ?peer_addr, "connection task panicked");
        }
    });
}

async fn process_stream(
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    env: Arc<ConnectionEnv>,
    token: CancellationToken,
) {
    if let Err(e) = serve(stream, peer_addr, env, token).await {
        tracing::warn!(error = %e, ?peer_addr, "connection failed");
    }
}

async fn serve(
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    env: Arc<ConnectionEnv>,
    token: CancellationToken,
) -> Result<(), HandshakeError> {
    let handshake_timeout = env.config.handshake_timeout;
    let (accepted_tx, mut accepted_rx) = mpsc::channel(1);
    let app = router(Inbound {
        env,
        peer_addr,
        token,
        accepted: accepted_tx,
    });

    // Malformed heads are answered with 400 and oversized ones with 431
    // before the error surfaces here.
    http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(handshake_timeout)
        .max_buf_size(MAX_REQUEST_HEAD)
        .keep_alive(false)
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(app))
        .with_upgrades()
        .await?;

    // The router and its sender are gone; only a pending upgrade still holds one.
    let Some(Accepted {
        context,
        client,
        upstream,
    }) = accepted_rx.recv().await
    else {
        return Ok(());
    };
    context.info(format!("upgraded connection on {}", context.peer_label()));
    let report = run_session(context, client_leg(client), websocket_leg(upstream)).await;
    debug!(
        "session finished: id={}, client_to_upstream={}, upstream_to_client={}, \
         peer_addr={peer_addr:?}",
        report.id, report.client_to_upstream, report.upstream_to_client
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };
    use tokio_util::task::TaskTracker;
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        server::test_util::{connection_env, dead_remote},
        test_helpers::{OpenedSinks, opened_sink, recording_registry},
    };

    async fn serve_one(env: Arc<ConnectionEnv>, request: &[u8]) -> String {
        let tracker = TaskTracker::new();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("listener.local_addr");
        let driver = tokio::spawn({
            let tracker = tracker.clone();
            async move {
                let (stream, _) = listener.accept().await.expect("accept");
                spawn_connection_task(stream, env, CancellationToken::new(), &tracker);
                tracker.close();
                tracker.wait().await;
            }
        });

        let mut client = TcpStream::connect(addr).await.expect("connect");
        client.write_all(request).await.expect("write request");
        let mut response = String::new();
        client
            .read_to_string(&mut response)
            .await
            .expect("read response");
        driver.await.expect("join connection task driver");
        response
    }

    fn env_with(remote: String) -> (Arc<ConnectionEnv>, OpenedSinks) {
        let (registry, opened) = recording_registry();
        let config = ProxyConfig {
            remote,
            upstream_timeout: Duration::from_millis(500),
            ..ProxyConfig::default()
        };
        (connection_env(config, registry), opened)
    }

    #[rstest]
    #[tokio::test]
    async fn non_devtools_paths_get_404() {
        let (env, opened) = env_with(dead_remote());
        let response = serve_one(env, b"GET /json/list HTTP/1.1\r\nHost: x\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(opened.lock().expect("opened sinks").is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn unreachable_upstream_gets_500_and_is_logged() {
        let (env, opened) = env_with(dead_remote());
        let registry = Arc::clone(&env.registry);
        let response = serve_one(
            env,
            b"GET /devtools/page/P1 HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(response.contains("version error, got:"));

        let sink = opened_sink(&opened, "P1").expect("session sink");
        let records = sink.records();
        let first = records.first().map(|r| r.kind.body());
        assert!(first.is_some_and(|body| body.starts_with("---------- connection from 127.0.0.1:")));
        assert!(
            records
                .iter()
                .any(|r| r.kind.label() == "connection_error" && r.kind.body().starts_with("version error"))
        );
        assert_eq!(sink.closes(), 1);
        assert!(registry.is_empty());
    }

    #[rstest]
    #[traced_test]
    #[tokio::test]
    async fn malformed_request_gets_400() {
        let (env, opened) = env_with(dead_remote());
        let response = serve_one(env, b"NONSENSE\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
        assert!(opened.lock().expect("opened sinks").is_empty());
        assert!(logs_contain("connection failed"));
    }

    #[rstest]
    #[tokio::test]
    async fn absolute_form_target_is_routed_by_its_path() {
        let (env, opened) = env_with(dead_remote());
        let response = serve_one(
            env,
            b"GET http://proxy.test/devtools/page/P2 HTTP/1.1\r\nHost: proxy.test\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{response}");
        assert!(opened_sink(&opened, "P2").is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn plain_get_on_a_devtools_path_is_refused_after_the_checks() {
        let upstream = devtools_proxy_testing::FakeUpstream::start(
            devtools_proxy_testing::VersionReply::Ok,
        )
        .await
        .expect("upstream");
        let (env, opened) = env_with(upstream.remote());
        let response =
            serve_one(env, b"GET /devtools/page/P3 HTTP/1.1\r\nHost: x\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 4"), "{response}");

        let sink = opened_sink(&opened, "P3").expect("session sink");
        let records = sink.records();
        assert!(records.iter().any(|r| r.kind.body().starts_with("connected to ws://")));
        assert!(records.iter().any(|r| r.kind.label() == "connection_error"
            && r.kind.body().starts_with("could not upgrade connection on 127.0.0.1:")));
        assert_eq!(sink.closes(), 1);
    }

    /// Panics in connection handlers are logged and do not escape the task.
    #[rstest]
    #[traced_test]
    #[tokio::test]
    async fn spawn_connection_task_logs_panic() {
        let panicking = Arc::new(SinkRegistry::new(Arc::new(
            |_: &str| -> Result<Arc<dyn crate::sink::RecordSink>, crate::sink::SinkError> {
                panic!("boom")
            },
        )));
        let env = connection_env(
            ProxyConfig {
                remote: dead_remote(),
                ..ProxyConfig::default()
            },
            panicking,
        );
        let tracker = TaskTracker::new();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("listener.local_addr");

        let handle = tokio::spawn({
            let tracker = tracker.clone();
            async move {
                let (stream, _) = listener.accept().await.expect("accept");
                spawn_connection_task(stream, env, CancellationToken::new(), &tracker);
                tracker.close();
                tracker.wait().await;
            }
        });

        let mut client = TcpStream::connect(addr).await.expect("connect");
        let peer_addr = client.local_addr().expect("client.local_addr");
        client
            .write_all(b"GET /devtools/page/P1 HTTP/1.1\r\n\r\n")
            .await
            .expect("client.write_all");

        handle.await.expect("join connection task driver");
        tokio::task::yield_now().await;

        logs_assert(|lines: &[&str]| {
            lines
                .iter()
                .find(|line| {
                    line.contains("connection task panicked")
                        && line.contains("boom")
                        && line.contains(&format!("peer_addr=Some({peer_addr})"))
                })
                .map(|_| ())
                .ok_or_else(|| "panic log not found".to_string())
        });
    }
}
