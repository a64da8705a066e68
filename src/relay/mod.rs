//! Verbatim frame relay between the two legs of a session.
//!
//! A [`RelayPump`] copies frames from one leg to the other without touching
//! them and, on the side, publishes whatever it manages to decode to the
//! session's correlation engine. The pump is generic over its legs so tests
//! can drive it with in-memory channels; [`websocket_leg`] adapts the
//! upstream `tokio-tungstenite` stream and [`client_leg`] the upgraded client
//! socket.

use std::{fmt, str::Utf8Error};

use bytes::Bytes;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

mod publish;
mod pump;
mod websocket;

#[cfg(test)]
mod tests;

pub use publish::Publisher;
pub use pump::RelayPump;
pub use websocket::{client_leg, websocket_leg};

/// Errors raised by either leg of a session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The WebSocket layer failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    /// The upgraded client socket failed.
    #[error("client socket error: {0}")]
    ClientSocket(#[from] axum::Error),
    /// A text frame carried bytes that are not UTF-8.
    #[error("text frame is not valid UTF-8: {0}")]
    InvalidText(#[from] Utf8Error),
    /// The peer went away without a close handshake.
    #[error("peer disconnected")]
    Disconnected,
}

/// Status and reason carried by a close frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

/// One relayed WebSocket frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A text frame.
    Text(Bytes),
    /// A binary frame.
    Binary(Bytes),
    /// A close frame, forwarded before the session ends.
    Close(Option<CloseReason>),
}

impl Frame {
    /// Text frame holding `text`.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self { Self::Text(Bytes::from(text.into())) }

    /// Payload of a data frame, `None` for a close frame.
    #[must_use]
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            Self::Text(bytes) | Self::Binary(bytes) => Some(bytes),
            Self::Close(_) => None,
        }
    }

    /// Returns `true` for a close frame.
    #[must_use]
    pub fn is_close(&self) -> bool { matches!(self, Self::Close(_)) }
}

/// Why a pump stopped.
#[derive(Debug)]
pub enum PumpExit {
    /// The session token fired.
    Cancelled,
    /// The inbound leg ended or sent a close frame.
    Closed,
    /// Reading from the inbound leg failed.
    ReadFailed(TransportError),
    /// Writing to the outbound leg failed.
    WriteFailed(TransportError),
}

impl PumpExit {
    /// Returns `true` when the pump stopped because of an I/O failure.
    #[must_use]
    pub fn is_failure(&self) -> bool { matches!(self, Self::ReadFailed(_) | Self::WriteFailed(_)) }
}

impl fmt::Display for PumpExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::Closed => f.write_str("closed"),
            Self::ReadFailed(error) => write!(f, "read failed: {error}"),
            Self::WriteFailed(error) => write!(f, "write failed: {error}"),
        }
    }
}
