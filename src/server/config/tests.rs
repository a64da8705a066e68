//! Tests for server construction and binding.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use rstest::rstest;
use tokio::sync::oneshot;

use crate::{
    config::ProxyConfig,
    server::{
        ProxyServer,
        ServerError,
        test_util::{free_listener, registry},
    },
    sink::SinkRegistry,
};

#[rstest]
fn new_server_is_unbound(registry: Arc<SinkRegistry>) {
    let server = ProxyServer::new(Arc::new(ProxyConfig::default()), registry);
    assert!(server.local_addr().is_none());
    assert_eq!(server.config().remote, "localhost:9222");
}

#[rstest]
#[tokio::test]
async fn bind_existing_listener_reports_its_address(
    registry: Arc<SinkRegistry>,
    free_listener: std::net::TcpListener,
) {
    let expected = free_listener.local_addr().expect("listener address");
    let server = ProxyServer::new(Arc::new(ProxyConfig::default()), registry)
        .bind_existing_listener(free_listener)
        .expect("bind");
    assert_eq!(server.local_addr(), Some(expected));
}

#[rstest]
#[tokio::test]
async fn rebinding_moves_the_listener(registry: Arc<SinkRegistry>) {
    let any_port = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
    let server = ProxyServer::new(Arc::new(ProxyConfig::default()), registry)
        .bind(any_port)
        .expect("bind");
    let first = server.local_addr().expect("first address");
    let server = server.bind(any_port).expect("rebind");
    let second = server.local_addr().expect("second address");
    assert_ne!(first.port(), second.port());
}

#[rstest]
#[tokio::test]
async fn bind_to_taken_port_fails(
    registry: Arc<SinkRegistry>,
    free_listener: std::net::TcpListener,
) {
    let taken = free_listener.local_addr().expect("listener address");
    let result = ProxyServer::new(Arc::new(ProxyConfig::default()), registry).bind(taken);
    assert!(matches!(result, Err(ServerError::Bind(_))));
}

#[rstest]
fn ready_signal_is_kept_until_run(registry: Arc<SinkRegistry>) {
    let (tx, _rx) = oneshot::channel();
    let server = ProxyServer::new(Arc::new(ProxyConfig::default()), registry).ready_signal(tx);
    assert!(server.ready_tx.is_some());
}
