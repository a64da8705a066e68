//! Test helpers shared across server modules.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use rstest::fixture;

use super::{Bound, ProxyServer, connection::ConnectionEnv};
use crate::{config::ProxyConfig, sink::SinkRegistry, test_helpers::recording_registry};

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents race conditions where another
/// process could claim the port between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

#[fixture]
/// Registry handing out in-memory recording sinks.
pub fn registry() -> Arc<SinkRegistry> { recording_registry().0 }

/// Address of a local port nobody listens on.
///
/// The port is released before returning, so connections to it are refused
/// unless another process grabs it in between; only use in tests.
#[must_use]
pub fn dead_remote() -> String {
    let listener = free_listener();
    let addr = listener
        .local_addr()
        .expect("failed to get listener address");
    drop(listener);
    addr.to_string()
}

pub(in crate::server) fn connection_env(
    config: ProxyConfig,
    registry: Arc<SinkRegistry>,
) -> Arc<ConnectionEnv> {
    Arc::new(ConnectionEnv {
        config: Arc::new(config),
        registry,
        http: reqwest::Client::new(),
    })
}

pub fn bind_server(config: ProxyConfig, listener: StdTcpListener) -> ProxyServer<Bound> {
    ProxyServer::new(Arc::new(config), registry())
        .bind_existing_listener(listener)
        .expect("Failed to bind")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_remote_refuses_connections() {
        let addr = dead_remote();
        assert!(std::net::TcpStream::connect(addr).is_err());
    }
}
