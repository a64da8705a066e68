//! Errors raised by [`ProxyServer`](super::ProxyServer) operations.

use std::io;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors that may occur while binding or running the server.
///
/// Accept failures are retried with back-off and never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or configuring the listener failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
    /// The HTTP client used for upstream version checks could not be built.
    #[error("http client error: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Failures while serving the client's upgrade request.
///
/// `hyper` has already answered a malformed request with 400, or an
/// oversized head with 431, by the time one of these surfaces.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The request was malformed, oversized or too slow to arrive, or the
    /// connection failed while it was being answered.
    #[error("upgrade request failed: {0}")]
    Http(#[from] hyper::Error),
}

/// The upstream endpoint cannot serve a session.
///
/// Every variant is fatal to session setup only: the client receives an
/// HTTP 500 and no pumps start.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The version endpoint could not be reached or answered with an error
    /// status.
    #[error("version error, got: {0}")]
    Version(#[from] reqwest::Error),
    /// The version endpoint answered with something other than a JSON object.
    #[error("version error, got: expected json result")]
    UnexpectedVersionBody,
    /// The upstream did not answer within the configured timeout.
    #[error("timed out contacting {endpoint}")]
    TimedOut {
        /// Endpoint that was being contacted.
        endpoint: String,
    },
    /// Opening the upstream WebSocket failed.
    #[error("could not connect to {endpoint}, got: {source}")]
    Dial {
        /// WebSocket URL that was dialled.
        endpoint: String,
        /// Underlying handshake or transport failure.
        #[source]
        source: tungstenite::Error,
    },
}
