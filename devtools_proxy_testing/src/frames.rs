//! Builders for raw protocol frames.
//!
//! Every builder returns the exact JSON text a peer would put on the wire.

use serde_json::{Value, json};

/// A request: `{"id":…,"method":…,"params":…}`.
#[must_use]
pub fn request(id: u64, method: &str, params: Value) -> String {
    json!({"id": id, "method": method, "params": params}).to_string()
}

/// A successful response.
#[must_use]
pub fn response(id: u64, result: Value) -> String { json!({"id": id, "result": result}).to_string() }

/// An error response.
#[must_use]
pub fn error_response(id: u64, code: i64, message: &str) -> String {
    json!({"id": id, "error": {"code": code, "message": message}}).to_string()
}

/// An event.
#[must_use]
pub fn event(method: &str, params: Value) -> String {
    json!({"method": method, "params": params}).to_string()
}

/// `frame` re-addressed to a flattened sub-session.
///
/// # Panics
///
/// Panics if `frame` is not a JSON object.
#[must_use]
pub fn flattened(session_id: &str, frame: &str) -> String {
    let mut value: Value = serde_json::from_str(frame).expect("frame is JSON");
    let object = value.as_object_mut().expect("frame is a JSON object");
    object.insert("sessionId".to_owned(), Value::from(session_id));
    value.to_string()
}

/// A `Target.sendMessageToTarget` request wrapping `inner`.
#[must_use]
pub fn send_to_target(id: u64, session_id: &str, inner: &str) -> String {
    request(
        id,
        "Target.sendMessageToTarget",
        json!({"sessionId": session_id, "message": inner}),
    )
}

/// A `Target.receivedMessageFromTarget` event wrapping `inner`.
#[must_use]
pub fn received_from_target(session_id: &str, inner: &str) -> String {
    event(
        "Target.receivedMessageFromTarget",
        json!({"sessionId": session_id, "message": inner}),
    )
}
