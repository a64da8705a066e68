//! Runtime control for [`ProxyServer`].

mod accept;
mod backoff;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::Future;
use log::{info, warn};
use tokio::{select, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, ProxyServer, ServerError, connection::ConnectionEnv};

impl ProxyServer<Bound> {
    /// Run the server until Ctrl+C is received.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    ///
    /// use devtools_proxy::{
    ///     config::ProxyConfig,
    ///     server::ProxyServer,
    ///     sink::{SinkRegistry, TracingSinkFactory},
    /// };
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), devtools_proxy::server::ServerError> {
    /// let registry = Arc::new(SinkRegistry::new(Arc::new(TracingSinkFactory)));
    /// let server = ProxyServer::new(Arc::new(ProxyConfig::default()), registry)
    ///     .bind(([127, 0, 0, 1], 9223).into())?;
    /// server.run().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Attempting to run a server without binding fails to compile:
    ///
    /// ```compile_fail
    /// use std::sync::Arc;
    ///
    /// use devtools_proxy::{
    ///     config::ProxyConfig,
    ///     server::ProxyServer,
    ///     sink::{SinkRegistry, TracingSinkFactory},
    /// };
    ///
    /// async fn try_run() {
    ///     let registry = Arc::new(SinkRegistry::new(Arc::new(TracingSinkFactory)));
    ///     ProxyServer::new(Arc::new(ProxyConfig::default()), registry)
    ///         .run()
    ///         .await
    ///         .expect("unbound servers do not expose run()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the upstream HTTP client cannot be built.
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// Shutdown cancels every running session and waits for them to close.
    /// With [`ProxyConfig::once`](crate::config::ProxyConfig::once) set the
    /// server also returns after its first connection finishes.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the upstream HTTP client cannot be built.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let ProxyServer {
            config,
            registry,
            ready_tx,
            state: Bound { listener },
        } = self;
        let http = reqwest::Client::builder()
            .build()
            .map_err(ServerError::HttpClient)?;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let options = AcceptLoopOptions {
            shutdown: shutdown_token.clone(),
            tracker: tracker.clone(),
            backoff: config.backoff,
            once: config.once,
        };
        let env = Arc::new(ConnectionEnv {
            config,
            registry,
            http,
        });

        tracker.spawn(accept_loop(listener, env, options));
        // Spawning stays possible after closing; `wait` now resolves once the
        // accept loop and every connection task are done.
        tracker.close();

        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => {
                info!("shutdown requested, closing sessions");
                shutdown_token.cancel();
            }
            () = tracker.wait() => {}
        }

        tracker.wait().await;
        Ok(())
    }
}
