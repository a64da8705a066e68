//! Structured records produced by the correlation engine.
//!
//! A [`Record`] is what sinks receive. Payloads are pre-rendered as compact
//! JSON; truncation is cosmetic and applied only after filtering, so neither
//! filtering nor correlation ever see a shortened payload.

use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

/// Label used for the top-level channel of a session.
pub const TOP_LEVEL_LABEL: &str = "main protocol target";
/// Target id given to sub-session messages that name no target.
pub const UNKNOWN_TARGET: &str = "unknown target";
/// Marker appended to truncated payloads.
pub const TRUNCATION_MARKER: &str = "...";

/// Identity of the logical channel a record belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChannelId {
    /// The session's own connection.
    TopLevel,
    /// A sub-session, keyed by its target id.
    Target(String),
}

impl ChannelId {
    /// Target id of a sub-session, `None` for the top level.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::TopLevel => None,
            Self::Target(id) => Some(id),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopLevel => f.pad(TOP_LEVEL_LABEL),
            Self::Target(id) => f.pad(id),
        }
    }
}

/// Kind and payload of a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordKind {
    /// Session lifecycle information.
    ConnectionInfo {
        /// Human-readable description.
        message: String,
    },
    /// A non-fatal problem observed on the session.
    ConnectionError {
        /// Human-readable description.
        message: String,
    },
    /// A request observed before its response arrived.
    Request {
        /// Request method.
        method: String,
        /// Rendered request parameters.
        params: String,
    },
    /// An asynchronous event.
    Event {
        /// Event method.
        method: String,
        /// Rendered event parameters.
        params: String,
    },
    /// A successful response paired with its request.
    ResponseOk {
        /// Method of the originating request.
        method: String,
        /// Rendered parameters of the originating request.
        params: String,
        /// Rendered response result.
        result: String,
    },
    /// A failed response paired with its request.
    ResponseError {
        /// Method of the originating request.
        method: String,
        /// Rendered parameters of the originating request.
        params: String,
        /// Rendered response error.
        error: String,
    },
    /// A response whose id matched no pending request.
    CorrelationMiss {
        /// The unmatched id.
        id: u64,
    },
}

impl RecordKind {
    /// Short label identifying the kind in structured output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::ConnectionInfo { .. } => "connection",
            Self::ConnectionError { .. } => "connection_error",
            Self::Request { .. } => "request",
            Self::Event { .. } => "event",
            Self::ResponseOk { .. } => "response",
            Self::ResponseError { .. } => "response_error",
            Self::CorrelationMiss { .. } => "correlation_miss",
        }
    }

    /// Method name, when the kind carries one.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. }
            | Self::Event { method, .. }
            | Self::ResponseOk { method, .. }
            | Self::ResponseError { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Text the filter matches against after the method name.
    #[must_use]
    pub fn body(&self) -> String {
        match self {
            Self::ConnectionInfo { message } | Self::ConnectionError { message } => message.clone(),
            Self::Request { params, .. } | Self::Event { params, .. } => params.clone(),
            Self::ResponseOk { params, result, .. } => format!("{params}{result}"),
            Self::ResponseError { params, error, .. } => format!("{params}{error}"),
            Self::CorrelationMiss { id } => format!("could not find request with id: {id}"),
        }
    }

    /// Shorten every rendered payload to at most `max_len` bytes.
    #[must_use]
    pub fn truncated(self, max_len: usize) -> Self {
        if max_len == 0 {
            return self;
        }
        let cut = |text: String| truncate(text, max_len);
        match self {
            Self::Request { method, params } => Self::Request {
                method,
                params: cut(params),
            },
            Self::Event { method, params } => Self::Event {
                method,
                params: cut(params),
            },
            Self::ResponseOk {
                method,
                params,
                result,
            } => Self::ResponseOk {
                method,
                params: cut(params),
                result: cut(result),
            },
            Self::ResponseError {
                method,
                params,
                error,
            } => Self::ResponseError {
                method,
                params: cut(params),
                error: cut(error),
            },
            other => other,
        }
    }
}

/// One entry of the protocol trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Wall-clock time the record was produced.
    pub timestamp: DateTime<Local>,
    /// Channel the record belongs to.
    pub channel: ChannelId,
    /// What happened.
    pub kind: RecordKind,
}

impl Record {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn now(channel: ChannelId, kind: RecordKind) -> Self {
        Self {
            timestamp: Local::now(),
            channel,
            kind,
        }
    }

    /// Convenience constructor for a top-level [`RecordKind::ConnectionInfo`].
    #[must_use]
    pub fn connection_info(message: impl Into<String>) -> Self {
        Self::now(
            ChannelId::TopLevel,
            RecordKind::ConnectionInfo {
                message: message.into(),
            },
        )
    }

    /// Convenience constructor for a top-level [`RecordKind::ConnectionError`].
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::now(
            ChannelId::TopLevel,
            RecordKind::ConnectionError {
                message: message.into(),
            },
        )
    }
}

/// Render a payload as compact JSON. `null` renders as `{}`.
pub fn render<T: Serialize + ?Sized>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(rendered) if rendered == "null" => "{}".to_owned(),
        Ok(rendered) => rendered,
        Err(error) => error.to_string(),
    }
}

/// Shorten `text` to at most `max_len` bytes plus [`TRUNCATION_MARKER`].
///
/// The cut backs off to the nearest character boundary. A `max_len` of zero
/// disables truncation.
///
/// ```
/// use devtools_proxy::record::truncate;
///
/// assert_eq!(truncate("abcdef".into(), 3), "abc...");
/// assert_eq!(truncate("abc".into(), 0), "abc");
/// ```
#[must_use]
pub fn truncate(mut text: String, max_len: usize) -> String {
    if max_len == 0 || text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text.push_str(TRUNCATION_MARKER);
    text
}
