//! Accept-loop utilities for server runtime.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::{info, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::sleep,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::backoff::{Backoff, BackoffConfig};
use crate::server::connection::{ConnectionEnv, spawn_connection_task};

/// Abstraction for sources of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

#[derive(Debug)]
pub(in crate::server) struct AcceptLoopOptions {
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
    /// Stop accepting after the first connection.
    pub once: bool,
}

enum Step {
    Continue,
    Stop,
}

/// Accepts incoming connections and spawns a connection task for each.
///
/// Failures to accept a connection trigger an exponential back-off governed
/// by `options.backoff`. The loop terminates when `options.shutdown` is
/// cancelled, or after the first accepted connection in single-session mode.
/// Every session runs under a child of the shutdown token, so cancelling it
/// also closes the sessions.
pub(in crate::server) async fn accept_loop<L>(
    listener: Arc<L>,
    env: Arc<ConnectionEnv>,
    options: AcceptLoopOptions,
) where
    L: AcceptListener + Send + Sync + 'static,
{
    let mut backoff = Backoff::new(options.backoff);
    while let Step::Continue = accept_iteration(&listener, &env, &options, &mut backoff).await {}
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn accept_iteration<L>(
    listener: &Arc<L>,
    env: &Arc<ConnectionEnv>,
    options: &AcceptLoopOptions,
    backoff: &mut Backoff,
) -> Step
where
    L: AcceptListener + Send + Sync + 'static,
{
    select! {
        biased;

        () = options.shutdown.cancelled() => Step::Stop,
        res = listener.accept() => match res {
            Ok((stream, peer_addr)) => {
                info!("accepted connection: peer_addr={peer_addr}");
                backoff.reset();
                spawn_connection_task(
                    stream,
                    Arc::clone(env),
                    options.shutdown.child_token(),
                    &options.tracker,
                );
                if options.once {
                    info!("single-session mode, no longer accepting connections");
                    Step::Stop
                } else {
                    Step::Continue
                }
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                let delay = backoff.next_delay();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}, retry_in={delay:?}");
                select! {
                    biased;

                    () = options.shutdown.cancelled() => Step::Stop,
                    () = sleep(delay) => Step::Continue,
                }
            }
        },
    }
}
