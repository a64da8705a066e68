//! Version check and WebSocket dial against the upstream browser.

use std::time::Duration;

use serde_json::{Map, Value};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::error::UpstreamError;

/// WebSocket connection to the upstream browser.
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Ask `remote` for `/json/version` and return the reported fields.
///
/// # Errors
///
/// Returns [`UpstreamError`] on transport failure, a non-2xx status, a body
/// that is not a JSON object, or no answer within `limit`.
pub async fn check_version(
    client: &reqwest::Client,
    remote: &str,
    limit: Duration,
) -> Result<Map<String, Value>, UpstreamError> {
    let endpoint = format!("http://{remote}/json/version");
    let request = async {
        let response = client.get(&endpoint).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        Ok::<_, UpstreamError>(body)
    };
    let body = timeout(limit, request)
        .await
        .map_err(|_| UpstreamError::TimedOut {
            endpoint: endpoint.clone(),
        })??;
    match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(fields)) => Ok(fields),
        _ => Err(UpstreamError::UnexpectedVersionBody),
    }
}

/// Summary of a version report for the session log.
#[must_use]
pub fn describe_version(fields: &Map<String, Value>) -> String {
    match fields.get("Browser") {
        Some(Value::String(browser)) => browser.clone(),
        _ => Value::Object(fields.clone()).to_string(),
    }
}

/// WebSocket URL on `remote` for the request `path`.
#[must_use]
pub fn upstream_endpoint(remote: &str, path: &str) -> String { format!("ws://{remote}{path}") }

/// Open the upstream WebSocket at `endpoint` within `limit`.
///
/// # Errors
///
/// Returns [`UpstreamError::Dial`] if the connection or handshake fails, or
/// [`UpstreamError::TimedOut`] if it does not complete in time.
pub async fn dial(endpoint: &str, limit: Duration) -> Result<UpstreamSocket, UpstreamError> {
    match timeout(limit, connect_async(endpoint)).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(source)) => Err(UpstreamError::Dial {
            endpoint: endpoint.to_owned(),
            source,
        }),
        Err(_) => Err(UpstreamError::TimedOut {
            endpoint: endpoint.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn describes_browser_field_when_present() {
        let Value::Object(fields) = json!({"Browser": "Chrome/140.0", "Protocol-Version": "1.3"})
        else {
            panic!("object literal");
        };
        assert_eq!(describe_version(&fields), "Chrome/140.0");
    }

    #[test]
    fn describes_whole_report_otherwise() {
        let Value::Object(fields) = json!({"Protocol-Version": "1.3"}) else {
            panic!("object literal");
        };
        assert_eq!(describe_version(&fields), r#"{"Protocol-Version":"1.3"}"#);
    }

    #[test]
    fn endpoint_keeps_request_path() {
        assert_eq!(
            upstream_endpoint("localhost:9222", "/devtools/page/A?x=1"),
            "ws://localhost:9222/devtools/page/A?x=1"
        );
    }
}
