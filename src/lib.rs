#![doc(html_root_url = "https://docs.rs/devtools_proxy/latest")]
//! Public API for the `devtools_proxy` library.
//!
//! An intercepting proxy for the browser remote-debugging protocol. Frames
//! are relayed unmodified between a debugging client and the browser while a
//! per-session correlation engine pairs requests with responses, follows
//! sub-session traffic and hands structured records to pluggable sinks.

pub mod config;
pub mod correlation;
pub mod filter;
pub mod metrics;
pub mod panic;
pub mod protocol;
pub mod record;
pub mod relay;
pub mod server;
pub mod session;
pub mod sink;
pub mod test_helpers;

pub use config::{BackpressurePolicy, ProxyConfig};
pub use correlation::{CorrelationEngine, CorrelationSummary};
pub use filter::Filter;
pub use protocol::{DecodeError, ProtocolMessage, decode_protocol_message};
pub use record::{ChannelId, Record, RecordKind};
pub use relay::{Frame, PumpExit, RelayPump, TransportError};
pub use server::ProxyServer;
pub use session::{SessionContext, SessionReport, SessionState, run_session};
pub use sink::{RecordSink, SinkError, SinkFactory, SinkRegistry};
