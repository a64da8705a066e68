//! In-memory and loopback WebSocket endpoints.

use std::net::SocketAddr;

use tokio::{
    io::{DuplexStream, duplex},
    net::TcpStream,
};
use tokio_tungstenite::{
    MaybeTlsStream,
    WebSocketStream,
    connect_async,
    tungstenite::{self, protocol::Role},
};

/// Connected client and server WebSockets over an in-memory duplex pipe.
///
/// No handshake is performed; both ends speak framed WebSocket right away.
pub async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
    let (client, server) = duplex(64 * 1024);
    let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
    let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
    (client, server)
}

/// Open a debugging-client WebSocket to `proxy` for `path`.
///
/// # Errors
///
/// Returns the handshake error if the proxy refuses the upgrade.
pub async fn connect_client(
    proxy: SocketAddr,
    path: &str,
) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, tungstenite::Error> {
    let (socket, _response) = connect_async(format!("ws://{proxy}{path}")).await?;
    Ok(socket)
}
