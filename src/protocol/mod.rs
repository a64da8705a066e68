//! Decoded remote-debugging protocol messages.
//!
//! Every relayed frame is decoded best-effort into a [`ProtocolMessage`]
//! before it reaches the correlation engine. Payloads stay open JSON objects;
//! only the keys needed for routing (`sessionId`, `targetId` and `message`)
//! are ever interpreted.

use std::{borrow::Cow, fmt};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;


/// Method a client uses to wrap a message addressed to a target.
pub const SEND_MESSAGE_TO_TARGET: &str = "Target.sendMessageToTarget";
/// Method the browser uses to deliver a wrapped message from a target.
pub const RECEIVED_MESSAGE_FROM_TARGET: &str = "Target.receivedMessageFromTarget";

/// Errors raised while decoding a frame or an encapsulated message.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes are not a JSON object of the expected shape.
    #[error("malformed protocol frame: {0}")]
    Json(#[from] serde_json::Error),
    /// A target-domain envelope carried no string `message` parameter.
    #[error("`{method}` carries no encapsulated message")]
    MissingNestedMessage {
        /// Method of the envelope.
        method: String,
    },
}

/// Error payload attached to a failed response.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ErrorBody {
    /// Protocol error code; zero means "no error".
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Optional extra detail supplied by the debuggee.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct WireMessage {
    id: Option<u64>,
    method: Option<String>,
    params: Option<Map<String, Value>>,
    result: Option<Map<String, Value>>,
    error: Option<ErrorBody>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// One decoded protocol frame.
///
/// Classification is derived from the fields and never stored: a message is
/// exactly one of request, response or event.
///
/// ```
/// use devtools_proxy::protocol::ProtocolMessage;
///
/// let msg = ProtocolMessage::decode(r#"{"id":1,"method":"Page.enable"}"#).expect("decode");
/// assert!(msg.is_request());
/// assert_eq!(msg.method(), "Page.enable");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ProtocolMessage {
    id: Option<u64>,
    method: Option<String>,
    params: Map<String, Value>,
    result: Map<String, Value>,
    error: Option<ErrorBody>,
    session_id: Option<String>,
    raw: Bytes,
}

impl ProtocolMessage {
    /// Decode a frame. Unknown fields are ignored and missing ones default.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Json`] if `raw` is not a JSON object of the
    /// protocol shape.
    pub fn decode(raw: impl Into<Bytes>) -> Result<Self, DecodeError> {
        let raw = raw.into();
        let wire: WireMessage = serde_json::from_slice(&raw)?;
        Ok(Self {
            id: wire.id,
            method: wire.method,
            params: wire.params.unwrap_or_default(),
            result: wire.result.unwrap_or_default(),
            error: wire.error,
            session_id: wire.session_id,
            raw,
        })
    }

    /// Identifier, or zero when absent.
    #[must_use]
    pub fn id(&self) -> u64 { self.id.unwrap_or_default() }

    /// Method name, or the empty string when absent.
    #[must_use]
    pub fn method(&self) -> &str { self.method.as_deref().unwrap_or_default() }

    /// Request or event payload.
    #[must_use]
    pub fn params(&self) -> &Map<String, Value> { &self.params }

    /// Success response payload.
    #[must_use]
    pub fn result(&self) -> &Map<String, Value> { &self.result }

    /// Error payload, if the frame carried one.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorBody> { self.error.as_ref() }

    /// Flattened-mode session identifier, or the empty string.
    #[must_use]
    pub fn session_id(&self) -> &str { self.session_id.as_deref().unwrap_or_default() }

    /// The frame bytes this message was decoded from.
    #[must_use]
    pub fn raw(&self) -> &Bytes { &self.raw }

    /// `true` for a frame carrying both a method and a non-zero id.
    #[must_use]
    pub fn is_request(&self) -> bool { !self.method().is_empty() && self.id() > 0 }

    /// `true` for a frame carrying a non-zero id but no method.
    #[must_use]
    pub fn is_response(&self) -> bool { self.method().is_empty() && self.id() > 0 }

    /// `true` for anything that is neither a request nor a response.
    #[must_use]
    pub fn is_event(&self) -> bool { !(self.is_request() || self.is_response()) }

    /// `true` when the error payload has a non-zero code.
    #[must_use]
    pub fn is_error(&self) -> bool { self.error.as_ref().is_some_and(|e| e.code != 0) }

    /// `true` for the legacy encapsulation methods of the `Target` domain.
    #[must_use]
    pub fn belongs_to_target_domain(&self) -> bool {
        matches!(
            self.method(),
            SEND_MESSAGE_TO_TARGET | RECEIVED_MESSAGE_FROM_TARGET
        )
    }

    /// `true` when the message is addressed with a top-level `sessionId`.
    #[must_use]
    pub fn is_flattened(&self) -> bool { !self.session_id().is_empty() }

    /// `true` when the message belongs to a sub-session in either mode.
    #[must_use]
    pub fn has_sub_session(&self) -> bool { self.belongs_to_target_domain() || self.is_flattened() }

    /// Routing key of the sub-session this message belongs to.
    ///
    /// Flattened messages use their `sessionId`. Target-domain envelopes use
    /// `params.sessionId`, falling back to `params.targetId` for browsers that
    /// address wrapped traffic by target only. Everything else yields `""`.
    #[must_use]
    pub fn target_id(&self) -> &str {
        if self.is_flattened() {
            return self.session_id();
        }
        if self.belongs_to_target_domain() {
            for key in ["sessionId", "targetId"] {
                if let Some(Value::String(id)) = self.params.get(key)
                    && !id.is_empty()
                {
                    return id;
                }
            }
        }
        ""
    }

    /// Decode the message wrapped in `params.message` of a target-domain
    /// envelope.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MissingNestedMessage`] if the parameter is
    /// absent or not a string, or [`DecodeError::Json`] if it does not decode.
    pub fn decode_nested(&self) -> Result<Self, DecodeError> {
        match self.params.get("message") {
            Some(Value::String(nested)) => Self::decode(Bytes::copy_from_slice(nested.as_bytes())),
            _ => Err(DecodeError::MissingNestedMessage {
                method: self.method().to_owned(),
            }),
        }
    }
}

impl fmt::Display for ProtocolMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProtocolMessage(id={}, method={}, sessionId={})",
            self.id(),
            self.method(),
            self.session_id()
        )
    }
}

/// Resolve the message a sub-session actually exchanged.
///
/// Flattened messages and plain messages are returned unchanged. A
/// target-domain envelope is unwrapped exactly one level: the nested message
/// is assumed to be self-contained.
///
/// # Errors
///
/// Propagates [`ProtocolMessage::decode_nested`] failures.
pub fn decode_protocol_message(
    message: &ProtocolMessage,
) -> Result<Cow<'_, ProtocolMessage>, DecodeError> {
    if message.is_flattened() || !message.belongs_to_target_domain() {
        return Ok(Cow::Borrowed(message));
    }
    message.decode_nested().map(Cow::Owned)
}
