//! Shared utilities for integration tests.
//!
//! Starts a [`ProxyServer`] on a free loopback port with in-memory recording
//! sinks, and waits for sessions to finish.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
    time::Duration,
};

use devtools_proxy::{
    config::ProxyConfig,
    record::Record,
    server::{ProxyServer, ServerError},
    sink::SinkRegistry,
};
use devtools_proxy_testing::{OpenedSinks, RecordingSink, opened_sink, recording_registry};
use tokio::{sync::oneshot, task::JoinHandle};

/// Create a TCP listener bound to a free local port.
#[expect(
    clippy::expect_used,
    reason = "binding to an ephemeral localhost port must abort the test immediately"
)]
pub fn unused_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("failed to bind port")
}

/// Configuration pointing at `remote` with short upstream limits.
pub fn config_for(remote: String) -> ProxyConfig {
    ProxyConfig {
        remote,
        upstream_timeout: Duration::from_secs(2),
        handshake_timeout: Duration::from_secs(2),
        ..ProxyConfig::default()
    }
}

/// A running proxy and the sinks its sessions opened.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub registry: Arc<SinkRegistry>,
    pub opened: OpenedSinks,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), ServerError>>,
}

impl RunningProxy {
    /// Bind and run a proxy, returning once it accepts connections.
    pub async fn start(config: ProxyConfig) -> Self {
        let (registry, opened) = recording_registry();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = ProxyServer::new(Arc::new(config), Arc::clone(&registry))
            .ready_signal(ready_tx)
            .bind_existing_listener(unused_listener())
            .expect("bind proxy");
        let addr = server.local_addr().expect("proxy address");
        let task = tokio::spawn(server.run_with_shutdown(async {
            let _ = shutdown_rx.await;
        }));
        ready_rx.await.expect("proxy ready");
        Self {
            addr,
            registry,
            opened,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// The sink opened for `name`, waiting briefly for it to appear.
    pub async fn sink(&self, name: &str) -> Arc<RecordingSink> {
        for _ in 0..200 {
            if let Some(sink) = opened_sink(&self.opened, name) {
                return sink;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no sink opened for {name}");
    }

    /// Records of the sink `name` once its session has closed it.
    pub async fn closed_records(&self, name: &str) -> Vec<Record> {
        let sink = self.sink(name).await;
        for _ in 0..500 {
            if sink.closes() > 0 {
                return sink.records();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sink {name} was never closed");
    }

    /// Request shutdown and wait for the server to return.
    pub async fn stop(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.expect("join proxy task")
    }

    /// Wait for the server to return on its own.
    ///
    /// The shutdown trigger stays armed until the server has returned.
    pub async fn finished(self) -> Result<(), ServerError> {
        let Self { shutdown, task, .. } = self;
        let result = task.await.expect("join proxy task");
        drop(shutdown);
        result
    }
}
