//! Tokio-based proxy server.
//!
//! `ProxyServer` accepts debugging clients and serves each one over HTTP/1.1
//! with `hyper` and an `axum` router. The router checks and dials the
//! upstream browser, upgrades the client and hands both legs to
//! [`run_session`](crate::session::run_session).

use std::sync::Arc;

use tokio::{net::TcpListener, sync::oneshot};

use crate::{config::ProxyConfig, sink::SinkRegistry};

/// Tokio-based server relaying debugging sessions to one upstream browser.
///
/// The server carries a typestate `S` indicating whether it is
/// [`Unbound`] (not yet bound to a TCP listener) or [`Bound`]. New servers
/// start `Unbound` and must call [`bind`](ProxyServer::bind) or
/// [`bind_existing_listener`](ProxyServer::bind_existing_listener) before
/// running.
pub struct ProxyServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) config: Arc<ProxyConfig>,
    pub(crate) registry: Arc<SinkRegistry>,
    /// Channel used to notify when the server is ready.
    ///
    /// A `oneshot::Sender` can transmit only one readiness notification, so a
    /// new sender must be provided each time the server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    /// Typestate tracking whether the server has been bound to a listener.
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod config;
pub use config::binding;
mod connection;
pub mod error;
mod inbound;
mod runtime;
mod upstream;

pub use error::{HandshakeError, ServerError, UpstreamError};
/// Re-exported configuration types for server backoff behavior.
pub use runtime::BackoffConfig;
pub use connection::MAX_REQUEST_HEAD;
pub use inbound::{DEVTOOLS_ROUTE, NOT_FOUND_BODY};
pub use upstream::{check_version, dial};

#[cfg(test)]
pub(crate) mod test_util;
