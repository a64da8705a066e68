//! Adapters from WebSocket connections to relay legs.
//!
//! The upstream leg is a `tokio-tungstenite` client stream; the client leg is
//! the socket an axum upgrade hands over.

use axum::extract::ws::{self, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{
        Message,
        Utf8Bytes,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};

use super::{CloseReason, Frame, TransportError};

/// Split a WebSocket into the writer and reader halves a [`RelayPump`] uses.
///
/// Ping and pong frames are answered by the WebSocket itself and never
/// surface as [`Frame`]s.
///
/// [`RelayPump`]: super::RelayPump
pub fn websocket_leg<S>(
    socket: WebSocketStream<S>,
) -> (
    impl Sink<Frame, Error = TransportError> + Unpin + Send,
    impl Stream<Item = Result<Frame, TransportError>> + Unpin + Send,
)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (writer, reader) = socket.split();
    let writer = writer
        .sink_map_err(TransportError::from)
        .with(|frame: Frame| future::ready(into_message(frame)));
    let reader = reader.filter_map(|item| {
        future::ready(match item {
            Ok(message) => from_message(message).map(Ok),
            Err(error) => Some(Err(TransportError::from(error))),
        })
    });
    (writer, reader)
}

fn into_message(frame: Frame) -> Result<Message, TransportError> {
    Ok(match frame {
        Frame::Text(bytes) => Message::Text(Utf8Bytes::try_from(bytes)?),
        Frame::Binary(bytes) => Message::Binary(bytes),
        Frame::Close(reason) => Message::Close(reason.map(|reason| CloseFrame {
            code: CloseCode::from(reason.code),
            reason: Utf8Bytes::from(reason.reason),
        })),
    })
}

fn from_message(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text.into())),
        Message::Binary(bytes) => Some(Frame::Binary(bytes)),
        Message::Close(close) => Some(Frame::Close(close.map(|close| CloseReason {
            code: close.code.into(),
            reason: close.reason.as_str().to_owned(),
        }))),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

/// Split an upgraded client connection into relay halves.
///
/// Like [`websocket_leg`], control frames never surface as [`Frame`]s.
pub fn client_leg(
    socket: WebSocket,
) -> (
    impl Sink<Frame, Error = TransportError> + Unpin + Send,
    impl Stream<Item = Result<Frame, TransportError>> + Unpin + Send,
) {
    let (writer, reader) = socket.split();
    let writer = writer
        .sink_map_err(TransportError::from)
        .with(|frame: Frame| future::ready(into_client_message(frame)));
    let reader = reader.filter_map(|item| {
        future::ready(match item {
            Ok(message) => from_client_message(message).map(Ok),
            Err(error) => Some(Err(TransportError::from(error))),
        })
    });
    (writer, reader)
}

fn into_client_message(frame: Frame) -> Result<ws::Message, TransportError> {
    Ok(match frame {
        Frame::Text(bytes) => ws::Message::Text(ws::Utf8Bytes::try_from(bytes)?),
        Frame::Binary(bytes) => ws::Message::Binary(bytes),
        Frame::Close(reason) => ws::Message::Close(reason.map(|reason| ws::CloseFrame {
            code: reason.code,
            reason: ws::Utf8Bytes::from(reason.reason),
        })),
    })
}

fn from_client_message(message: ws::Message) -> Option<Frame> {
    match message {
        ws::Message::Text(text) => Some(Frame::Text(text.into())),
        ws::Message::Binary(bytes) => Some(Frame::Binary(bytes)),
        ws::Message::Close(close) => Some(Frame::Close(close.map(|close| CloseReason {
            code: close.code,
            reason: close.reason.as_str().to_owned(),
        }))),
        ws::Message::Ping(_) | ws::Message::Pong(_) => None,
    }
}
