//! Construction and configuration of [`ProxyServer`].

use std::sync::Arc;

use tokio::sync::oneshot;

use super::{ProxyServer, ServerState, Unbound};
use crate::{config::ProxyConfig, sink::SinkRegistry};

pub mod binding;

#[cfg(test)]
mod tests;

impl ProxyServer<Unbound> {
    /// Create a server relaying to `config.remote` and writing records to
    /// sinks opened through `registry`.
    ///
    /// The TCP listener is unset; call [`bind`](Self::bind) before running
    /// the server.
    #[must_use]
    pub fn new(config: Arc<ProxyConfig>, registry: Arc<SinkRegistry>) -> Self {
        Self {
            config,
            registry,
            ready_tx: None,
            state: Unbound,
        }
    }
}

impl<S> ProxyServer<S>
where
    S: ServerState,
{
    /// Configure a channel used to signal when the server is ready to accept
    /// connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Configuration shared with every session.
    #[must_use]
    pub fn config(&self) -> &Arc<ProxyConfig> { &self.config }

    /// Registry of named sinks shared by every session.
    #[must_use]
    pub fn registry(&self) -> &Arc<SinkRegistry> { &self.registry }
}
