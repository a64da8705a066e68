//! Request/response correlation and sub-session routing.
//!
//! One [`CorrelationEngine`] runs per session and consumes the decoded
//! messages both relay pumps publish, strictly in arrival order. It pairs
//! responses with the requests that caused them, per channel, unwraps
//! target-domain envelopes one level deep, and routes every resulting
//! [`Record`] through the [`Filter`] to the sink of its channel.
//!
//! The engine only observes. Nothing it does can delay or alter a frame, and
//! no message, however malformed, makes it panic.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use log::{debug, warn};
use tokio::sync::mpsc;

use crate::{
    config::ProxyConfig,
    filter::Filter,
    protocol::{DecodeError, ProtocolMessage},
    record::{ChannelId, Record, RecordKind, UNKNOWN_TARGET, render},
    sink::{RecordSink, SinkRegistry},
};

mod pending;

pub use pending::{PendingRequest, PendingTable};

/// Counts reported when a session's engine finishes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CorrelationSummary {
    /// Requests recorded in a pending table, encapsulated ones included.
    pub requests: u64,
    /// Events observed.
    pub events: u64,
    /// Responses paired with their request.
    pub paired: u64,
    /// Responses that matched no pending request.
    pub missed: u64,
    /// Encapsulated messages that failed to decode.
    pub decode_failures: u64,
    /// Requests still awaiting a response when the session closed.
    pub outstanding: usize,
    /// Sub-sessions seen during the session.
    pub sub_sessions: usize,
}

struct Emitter {
    filter: Filter,
    truncate_len: usize,
}

impl Emitter {
    /// Filter, truncate and deliver one record. Returns `true` if delivered.
    fn emit(&self, sink: &dyn RecordSink, channel: &ChannelId, kind: RecordKind) -> bool {
        let accepted = self
            .filter
            .accept(kind.method().unwrap_or_default(), &kind.body());
        if accepted {
            sink.emit(&Record::now(channel.clone(), kind.truncated(self.truncate_len)));
        }
        accepted
    }
}

struct Channel {
    pending: PendingTable,
    sink: Arc<dyn RecordSink>,
    registered: bool,
}

struct Channels {
    top: Channel,
    subs: HashMap<String, Channel>,
    top_sink: Arc<dyn RecordSink>,
    registry: Arc<SinkRegistry>,
    distribute_logs: bool,
}

impl Channels {
    fn get(&mut self, id: &ChannelId, emitter: &Emitter) -> &mut Channel {
        let Some(target) = id.target() else {
            return &mut self.top;
        };
        match self.subs.entry(target.to_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let channel =
                    open_sub_session(target, &self.registry, &self.top_sink, self.distribute_logs, emitter);
                entry.insert(channel)
            }
        }
    }

    fn outstanding(&self) -> usize {
        self.top.pending.len() + self.subs.values().map(|c| c.pending.len()).sum::<usize>()
    }

    fn release_all(&mut self) {
        for (target, channel) in self.subs.drain() {
            if channel.registered {
                self.registry.release(&target);
            }
        }
    }
}

fn open_sub_session(
    target: &str,
    registry: &SinkRegistry,
    top_sink: &Arc<dyn RecordSink>,
    distribute_logs: bool,
    emitter: &Emitter,
) -> Channel {
    let shared = || Channel {
        pending: PendingTable::default(),
        sink: Arc::clone(top_sink),
        registered: false,
    };
    if !distribute_logs || target == UNKNOWN_TARGET {
        return shared();
    }
    match registry.acquire(target) {
        Ok(sink) => Channel {
            pending: PendingTable::default(),
            sink,
            registered: true,
        },
        Err(error) => {
            warn!("sub-session sink unavailable, using session sink: target={target}, error={error}");
            emitter.emit(
                &**top_sink,
                &ChannelId::Target(target.to_owned()),
                RecordKind::ConnectionError {
                    message: error.to_string(),
                },
            );
            shared()
        }
    }
}

/// Per-session correlation state.
pub struct CorrelationEngine {
    emitter: Emitter,
    show_requests: bool,
    pending_warn_threshold: usize,
    channels: Channels,
    summary: CorrelationSummary,
}

impl CorrelationEngine {
    /// Create an engine writing top-level records to `top_sink` and opening
    /// sub-session sinks through `registry`.
    #[must_use]
    pub fn new(
        config: &ProxyConfig,
        top_sink: Arc<dyn RecordSink>,
        registry: Arc<SinkRegistry>,
    ) -> Self {
        Self {
            emitter: Emitter {
                filter: config.filter(),
                truncate_len: config.truncate_len,
            },
            show_requests: config.show_requests,
            pending_warn_threshold: config.pending_warn_threshold,
            channels: Channels {
                top: Channel {
                    pending: PendingTable::default(),
                    sink: Arc::clone(&top_sink),
                    registered: false,
                },
                subs: HashMap::new(),
                top_sink,
                registry,
                distribute_logs: config.distribute_logs,
            },
            summary: CorrelationSummary::default(),
        }
    }

    /// Consume messages until every sender of `messages` is gone, then tear
    /// the session's sub-session sinks down.
    pub async fn run(mut self, mut messages: mpsc::Receiver<ProtocolMessage>) -> CorrelationSummary {
        while let Some(message) = messages.recv().await {
            self.handle(message);
        }
        self.finish()
    }

    /// Process one decoded message.
    pub fn handle(&mut self, message: ProtocolMessage) {
        let channel = resolve_channel(&message);
        let envelope = message.belongs_to_target_domain() && !message.is_flattened();
        if message.is_request() {
            if envelope {
                // The envelope's own response comes back on the top level.
                self.channels
                    .top
                    .pending
                    .insert(message.id(), PendingRequest::Opaque);
                self.check_pending(&ChannelId::TopLevel);
                self.handle_nested(&channel, &message);
            } else {
                self.record_request(&channel, message);
            }
        } else if message.is_response() {
            self.record_response(&channel, &message);
        } else if envelope {
            self.handle_nested(&channel, &message);
        } else {
            self.record_event(&channel, &message);
        }
    }

    /// Release sub-session sinks and report what the session saw.
    pub fn finish(mut self) -> CorrelationSummary {
        self.summary.outstanding = self.channels.outstanding();
        self.summary.sub_sessions = self.channels.subs.len();
        self.channels.release_all();
        self.summary
    }

    /// Counts observed so far.
    #[must_use]
    pub fn summary(&self) -> CorrelationSummary { self.summary }

    fn handle_nested(&mut self, channel: &ChannelId, envelope: &ProtocolMessage) {
        match envelope.decode_nested() {
            Ok(inner) if inner.is_request() => self.record_request(channel, inner),
            Ok(inner) if inner.is_response() => self.record_response(channel, &inner),
            Ok(inner) => self.record_event(channel, &inner),
            Err(error) => self.record_decode_failure(channel, envelope, &error),
        }
    }

    fn record_request(&mut self, id: &ChannelId, request: ProtocolMessage) {
        self.summary.requests += 1;
        let channel = self.channels.get(id, &self.emitter);
        if self.show_requests {
            self.emitter.emit(
                &*channel.sink,
                id,
                RecordKind::Request {
                    method: request.method().to_owned(),
                    params: render(request.params()),
                },
            );
        }
        let request_id = request.id();
        if channel
            .pending
            .insert(request_id, PendingRequest::Request(request))
            .is_some()
        {
            debug!("request id reused before its response: channel={id}, id={request_id}");
        }
        self.check_pending(id);
    }

    fn record_response(&mut self, id: &ChannelId, response: &ProtocolMessage) {
        let channel = self.channels.get(id, &self.emitter);
        let kind = match channel.pending.remove(response.id()) {
            Some(PendingRequest::Opaque) => return,
            Some(PendingRequest::Request(request)) => {
                self.summary.paired += 1;
                let method = request.method().to_owned();
                let params = render(request.params());
                match response.error() {
                    Some(error) if response.is_error() => RecordKind::ResponseError {
                        method,
                        params,
                        error: render(error),
                    },
                    _ => RecordKind::ResponseOk {
                        method,
                        params,
                        result: render(response.result()),
                    },
                }
            }
            None => {
                self.summary.missed += 1;
                crate::metrics::inc_correlation_misses();
                debug!("could not find request: channel={id}, id={}", response.id());
                RecordKind::CorrelationMiss { id: response.id() }
            }
        };
        self.emitter.emit(&*channel.sink, id, kind);
    }

    fn record_event(&mut self, id: &ChannelId, event: &ProtocolMessage) {
        self.summary.events += 1;
        let channel = self.channels.get(id, &self.emitter);
        self.emitter.emit(
            &*channel.sink,
            id,
            RecordKind::Event {
                method: event.method().to_owned(),
                params: render(event.params()),
            },
        );
    }

    fn record_decode_failure(&mut self, id: &ChannelId, envelope: &ProtocolMessage, error: &DecodeError) {
        self.summary.decode_failures += 1;
        crate::metrics::inc_decode_errors();
        debug!("encapsulated message dropped: channel={id}, envelope={envelope}, error={error}");
        let channel = self.channels.get(id, &self.emitter);
        self.emitter.emit(
            &*channel.sink,
            id,
            RecordKind::ConnectionError {
                message: error.to_string(),
            },
        );
    }

    fn check_pending(&mut self, id: &ChannelId) {
        let threshold = self.pending_warn_threshold;
        let channel = self.channels.get(id, &self.emitter);
        if channel.pending.crossed(threshold) {
            warn!(
                "outstanding requests exceed threshold, entries are kept until the session \
                 closes: channel={id}, outstanding={}, threshold={threshold}",
                channel.pending.len()
            );
        }
    }
}

impl Drop for CorrelationEngine {
    fn drop(&mut self) { self.channels.release_all(); }
}

/// Channel a message belongs to before any unwrapping.
///
/// Sub-session messages that carry no usable routing key share the
/// [`UNKNOWN_TARGET`] channel, never the top-level pending table.
fn resolve_channel(message: &ProtocolMessage) -> ChannelId {
    if !message.has_sub_session() {
        return ChannelId::TopLevel;
    }
    match message.target_id() {
        "" => ChannelId::Target(UNKNOWN_TARGET.to_owned()),
        target => ChannelId::Target(target.to_owned()),
    }
}
