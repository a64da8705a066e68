//! A scripted stand-in for the browser's remote-debugging endpoint.
//!
//! [`FakeUpstream`] answers `/json/version`, accepts WebSocket upgrades on
//! any other path and answers every request it receives, so a proxy can be
//! driven end to end over loopback TCP.

use std::{io, net::SocketAddr};

use axum::{
    Router,
    extract::{
        State,
        ws::{self, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::tungstenite::Message;

use crate::frames;

/// Body served from `/json/version` by a healthy upstream.
pub const VERSION_BODY: &str = r#"{"Browser":"FakeBrowser/1.0","Protocol-Version":"1.3"}"#;

/// How the upstream answers `/json/version`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionReply {
    /// `200 OK` with [`VERSION_BODY`].
    Ok,
    /// The given status with a plain-text body.
    Status(u16),
    /// `200 OK` with a body that is not JSON.
    NotJson,
}

#[derive(Clone)]
struct Script {
    reply: VersionReply,
    greeting: Vec<String>,
    received: mpsc::UnboundedSender<Message>,
}

/// Loopback upstream browser.
///
/// Requests are answered with `{"id":…,"result":{"method":…}}`, keeping any
/// `sessionId`. A `Target.sendMessageToTarget` request is answered with an
/// empty result followed by a `Target.receivedMessageFromTarget` event
/// carrying the answer to the wrapped request.
pub struct FakeUpstream {
    addr: SocketAddr,
    received: mpsc::UnboundedReceiver<Message>,
    task: JoinHandle<()>,
}

impl FakeUpstream {
    /// Start an upstream answering `/json/version` with `reply`.
    ///
    /// # Errors
    ///
    /// Returns an error if no loopback port can be bound.
    pub async fn start(reply: VersionReply) -> io::Result<Self> {
        Self::with_greeting(reply, Vec::new()).await
    }

    /// Start an upstream that sends `greeting` frames right after each
    /// WebSocket upgrade.
    ///
    /// # Errors
    ///
    /// Returns an error if no loopback port can be bound.
    pub async fn with_greeting(reply: VersionReply, greeting: Vec<String>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, received) = mpsc::unbounded_channel();
        let app = Router::new()
            .route("/json/version", get(version))
            .fallback(upgrade)
            .with_state(Script {
                reply,
                greeting,
                received: tx,
            });
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::debug!("fake upstream stopped: error={e}");
            }
        });
        Ok(Self {
            addr,
            received,
            task,
        })
    }

    /// `host:port` to configure as the proxy's remote.
    #[must_use]
    pub fn remote(&self) -> String { self.addr.to_string() }

    /// Next WebSocket message the upstream received, if any arrives.
    pub async fn next_received(&mut self) -> Option<Message> { self.received.recv().await }
}

impl Drop for FakeUpstream {
    fn drop(&mut self) { self.task.abort(); }
}

async fn version(State(script): State<Script>) -> Response {
    let (status, body) = match script.reply {
        VersionReply::Ok => (StatusCode::OK, VERSION_BODY),
        VersionReply::Status(status) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            "unavailable",
        ),
        VersionReply::NotJson => (StatusCode::OK, "not json"),
    };
    (status, [("content-type", "application/json")], body).into_response()
}

async fn upgrade(State(script): State<Script>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = converse(socket, script).await {
            log::debug!("fake upstream connection ended: error={e}");
        }
    })
}

async fn converse(mut socket: WebSocket, script: Script) -> Result<(), axum::Error> {
    for frame in script.greeting {
        socket.send(ws::Message::Text(frame.into())).await?;
    }
    while let Some(message) = socket.next().await {
        match message? {
            ws::Message::Text(text) => {
                let _ = script.received.send(Message::text(text.as_str()));
                for answer in answers_to(text.as_str()) {
                    socket.send(ws::Message::Text(answer.into())).await?;
                }
            }
            ws::Message::Binary(bytes) => {
                let _ = script.received.send(Message::Binary(bytes));
            }
            ws::Message::Close(_) => break,
            ws::Message::Ping(_) | ws::Message::Pong(_) => {}
        }
    }
    let _ = socket.close().await;
    Ok(())
}

fn answers_to(text: &str) -> Vec<String> {
    let Ok(Value::Object(message)) = serde_json::from_str::<Value>(text) else {
        return Vec::new();
    };
    let (Some(id), Some(method)) = (
        message.get("id").and_then(Value::as_u64),
        message.get("method").and_then(Value::as_str),
    ) else {
        return Vec::new();
    };

    if method == "Target.sendMessageToTarget" {
        let mut answers = vec![frames::response(id, json!({}))];
        let session = message["params"]["sessionId"].as_str().unwrap_or_default();
        if let Some(inner) = message["params"]["message"].as_str() {
            for inner_answer in answers_to(inner) {
                answers.push(frames::received_from_target(session, &inner_answer));
            }
        }
        return answers;
    }

    let answer = frames::response(id, json!({ "method": method }));
    match message.get("sessionId").and_then(Value::as_str) {
        Some(session) => vec![frames::flattened(session, &answer)],
        None => vec![answer],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_plain_requests() {
        let answers = answers_to(&frames::request(3, "Page.enable", json!({})));
        assert_eq!(answers, [r#"{"id":3,"result":{"method":"Page.enable"}}"#]);
    }

    #[test]
    fn ignores_events_and_garbage() {
        assert!(answers_to(&frames::event("Page.loadEventFired", json!({}))).is_empty());
        assert!(answers_to("garbage").is_empty());
    }

    #[test]
    fn answers_wrapped_requests_through_the_target_domain() {
        let inner = frames::request(7, "Runtime.enable", json!({}));
        let answers = answers_to(&frames::send_to_target(9, "S", &inner));
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0], r#"{"id":9,"result":{}}"#);
        let event: Value = serde_json::from_str(&answers[1]).expect("json");
        assert_eq!(event["method"], "Target.receivedMessageFromTarget");
        assert_eq!(event["params"]["sessionId"], "S");
        assert_eq!(
            event["params"]["message"],
            r#"{"id":7,"result":{"method":"Runtime.enable"}}"#
        );
    }
}
