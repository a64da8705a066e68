//! Per-connection session lifecycle.
//!
//! A session owns one correlation engine and two relay pumps sharing a
//! bounded message channel and a cancellation token. The pumps run until
//! either leg fails, either side closes, or the token fires; the engine then
//! drains whatever was published and releases the session's sinks.

use std::{
    net::SocketAddr,
    panic,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use derive_more::{Display, From};
use futures::{Sink, Stream};
use log::{debug, info};
use tokio::{select, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ProxyConfig,
    correlation::{CorrelationEngine, CorrelationSummary},
    metrics::Direction,
    record::Record,
    relay::{Frame, Publisher, PumpExit, RelayPump, TransportError},
    sink::{RecordSink, SinkError, SinkRegistry},
};

mod state;

pub use state::{SessionLifecycle, SessionState};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);
static ACTIVE_SESSIONS: AtomicU64 = AtomicU64::new(0);

/// Process-unique identifier of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, From)]
#[display("session-{_0}")]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

/// RAII guard counting a live session.
struct ActiveSession;

impl ActiveSession {
    fn new() -> Self {
        ACTIVE_SESSIONS.fetch_add(1, Ordering::Relaxed);
        crate::metrics::inc_sessions();
        Self
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        ACTIVE_SESSIONS.fetch_sub(1, Ordering::Relaxed);
        crate::metrics::dec_sessions();
    }
}

/// Return the number of sessions currently running.
#[must_use]
pub fn active_session_count() -> u64 { ACTIVE_SESSIONS.load(Ordering::Relaxed) }

/// Resources owned by one session.
///
/// The top-level sink is acquired from the registry when the context is
/// created and released exactly once when it is dropped.
pub struct SessionContext {
    id: SessionId,
    peer: Option<SocketAddr>,
    sink_name: String,
    top_sink: Arc<dyn RecordSink>,
    registry: Arc<SinkRegistry>,
    config: Arc<ProxyConfig>,
    token: CancellationToken,
    lifecycle: SessionLifecycle,
}

impl SessionContext {
    /// Create a session context whose top-level records go to the sink
    /// called `sink_name`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the top-level sink cannot be opened.
    pub fn open(
        peer: Option<SocketAddr>,
        sink_name: impl Into<String>,
        config: Arc<ProxyConfig>,
        registry: Arc<SinkRegistry>,
        token: CancellationToken,
    ) -> Result<Self, SinkError> {
        let sink_name = sink_name.into();
        let top_sink = registry.acquire(&sink_name)?;
        Ok(Self {
            id: SessionId::next(),
            peer,
            sink_name,
            top_sink,
            registry,
            config,
            token,
            lifecycle: SessionLifecycle::default(),
        })
    }

    /// Identifier of the session.
    #[must_use]
    pub fn id(&self) -> SessionId { self.id }

    /// Address of the debugging client, when known.
    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> { self.peer }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState { self.lifecycle.state() }

    /// Token cancelling every task of the session.
    #[must_use]
    pub fn token(&self) -> &CancellationToken { &self.token }

    /// Write a lifecycle message to the top-level sink, bypassing the filter.
    pub fn info(&self, message: impl Into<String>) {
        self.top_sink.emit(&Record::connection_info(message));
    }

    /// Write a lifecycle problem to the top-level sink, bypassing the filter.
    pub fn error(&self, message: impl Into<String>) {
        self.top_sink.emit(&Record::connection_error(message));
    }

    pub(crate) fn peer_label(&self) -> String {
        self.peer
            .map_or_else(|| "unknown peer".to_owned(), |peer| peer.to_string())
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) { self.registry.release(&self.sink_name); }
}

/// Outcome of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    /// Identifier of the session.
    pub id: SessionId,
    /// Why the client-to-upstream pump stopped.
    pub client_to_upstream: PumpExit,
    /// Why the upstream-to-client pump stopped.
    pub upstream_to_client: PumpExit,
    /// Counts reported by the correlation engine.
    pub summary: CorrelationSummary,
    /// Final lifecycle state; always [`SessionState::Closed`].
    pub state: SessionState,
}

/// Relay between `client` and `upstream` until the session ends.
///
/// Each leg is a `(writer, reader)` pair such as the one returned by
/// [`websocket_leg`](crate::relay::websocket_leg). A panic in a pump or in
/// the engine cancels the session and is resumed on the caller's task.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub async fn run_session<CW, CR, UW, UR>(
    mut context: SessionContext,
    client: (CW, CR),
    upstream: (UW, UR),
) -> SessionReport
where
    CW: Sink<Frame, Error = TransportError> + Unpin + Send + 'static,
    CR: Stream<Item = Result<Frame, TransportError>> + Unpin + Send + 'static,
    UW: Sink<Frame, Error = TransportError> + Unpin + Send + 'static,
    UR: Stream<Item = Result<Frame, TransportError>> + Unpin + Send + 'static,
{
    let _active = ActiveSession::new();
    let (client_writer, client_reader) = client;
    let (upstream_writer, upstream_reader) = upstream;
    let config = Arc::clone(&context.config);
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));

    let engine = CorrelationEngine::new(
        &config,
        Arc::clone(&context.top_sink),
        Arc::clone(&context.registry),
    );
    let engine = tokio::spawn(engine.run(rx));
    let mut outbound = tokio::spawn(
        RelayPump::new(
            Direction::ClientToUpstream,
            client_reader,
            upstream_writer,
            Publisher::new(tx.clone(), config.backpressure, Direction::ClientToUpstream),
            context.token.clone(),
        )
        .run(),
    );
    let mut inbound = tokio::spawn(
        RelayPump::new(
            Direction::UpstreamToClient,
            upstream_reader,
            client_writer,
            Publisher::new(tx, config.backpressure, Direction::UpstreamToClient),
            context.token.clone(),
        )
        .run(),
    );
    context.lifecycle.advance(SessionState::Relaying);
    info!("session relaying: id={}, peer={:?}", context.id, context.peer);

    let (client_to_upstream, upstream_to_client) = select! {
        exit = &mut outbound => {
            context.lifecycle.advance(SessionState::Draining);
            let first = joined(exit, &context.token);
            (first, joined(inbound.await, &context.token))
        }
        exit = &mut inbound => {
            context.lifecycle.advance(SessionState::Draining);
            let first = joined(exit, &context.token);
            (joined(outbound.await, &context.token), first)
        }
    };
    debug!(
        "session pumps stopped: id={}, client_to_upstream={client_to_upstream}, \
         upstream_to_client={upstream_to_client}",
        context.id
    );

    let summary = joined_engine(engine).await;
    context.lifecycle.advance(SessionState::Closed);
    context.info(format!("---------- closing {} ----------", context.peer_label()));
    info!(
        "session closed: id={}, paired={}, missed={}, events={}, outstanding={}",
        context.id, summary.paired, summary.missed, summary.events, summary.outstanding
    );

    SessionReport {
        id: context.id,
        client_to_upstream,
        upstream_to_client,
        summary,
        state: context.state(),
    }
}

fn joined(
    result: Result<PumpExit, tokio::task::JoinError>,
    token: &CancellationToken,
) -> PumpExit {
    match result {
        Ok(exit) => exit,
        Err(error) => {
            token.cancel();
            if error.is_panic() {
                panic::resume_unwind(error.into_panic());
            }
            PumpExit::Cancelled
        }
    }
}

async fn joined_engine(engine: JoinHandle<CorrelationSummary>) -> CorrelationSummary {
    match engine.await {
        Ok(summary) => summary,
        Err(error) if error.is_panic() => panic::resume_unwind(error.into_panic()),
        Err(_) => CorrelationSummary::default(),
    }
}
