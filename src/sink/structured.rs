//! Records rendered as `tracing` events.
//!
//! Useful when the proxy runs under a collector: every record becomes one
//! event with the channel, kind and method as fields instead of a formatted
//! line.

use std::sync::Arc;

use tracing::{Level, event};

use super::{RecordSink, SinkError, SinkFactory};
use crate::record::{Record, RecordKind};

/// Sink emitting one `tracing` event per record.
#[derive(Clone, Debug, Default)]
pub struct TracingSink {
    name: String,
}

impl TracingSink {
    /// Create a sink whose events carry `name` in the `sink` field.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into() } }

    /// Name reported in the `sink` field.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }
}

impl RecordSink for TracingSink {
    fn emit(&self, record: &Record) {
        let kind = record.kind.label();
        let channel = record.channel.to_string();
        let method = record.kind.method().unwrap_or_default();
        let body = record.kind.body();
        let timestamp = record.timestamp.to_rfc3339();
        match &record.kind {
            RecordKind::ConnectionError { .. } | RecordKind::CorrelationMiss { .. } => event!(
                target: "devtools_proxy::trace",
                Level::WARN,
                sink = %self.name,
                channel = %channel,
                kind,
                method,
                timestamp = %timestamp,
                "{body}"
            ),
            _ => event!(
                target: "devtools_proxy::trace",
                Level::INFO,
                sink = %self.name,
                channel = %channel,
                kind,
                method,
                timestamp = %timestamp,
                "{body}"
            ),
        }
    }
}

/// Opens a [`TracingSink`] per name.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSinkFactory;

impl SinkFactory for TracingSinkFactory {
    fn open(&self, name: &str) -> Result<Arc<dyn RecordSink>, SinkError> {
        Ok(Arc::new(TracingSink::new(name)))
    }
}
