//! HTTP side of a debugging connection.
//!
//! Each accepted socket is served by its own [`Router`]. Only
//! `/devtools/<kind>/<id>` opens a session: the handler checks and dials the
//! upstream before answering, so a failing browser is reported to the client
//! as HTTP 500 and no upgrade happens. Every other path gets a 404.

use std::{fmt, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::{
        Path,
        State,
        ws::{WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
};
use log::{debug, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    connection::ConnectionEnv,
    upstream::{UpstreamSocket, check_version, describe_version, dial, upstream_endpoint},
};
use crate::session::SessionContext;

/// Route serving debugging sessions.
pub const DEVTOOLS_ROUTE: &str = "/devtools/{kind}/{id}";

/// Body of the answer to any path other than [`DEVTOOLS_ROUTE`].
pub const NOT_FOUND_BODY: &str = "404 page not found\n";

/// A client upgraded to WebSocket, paired with its dialled upstream.
pub(in crate::server) struct Accepted {
    pub context: SessionContext,
    pub client: WebSocket,
    pub upstream: UpstreamSocket,
}

/// Per-connection router state.
#[derive(Clone)]
pub(in crate::server) struct Inbound {
    pub env: Arc<ConnectionEnv>,
    pub peer_addr: Option<SocketAddr>,
    pub token: CancellationToken,
    /// Upgraded sessions go back to the connection task through here.
    pub accepted: mpsc::Sender<Accepted>,
}

pub(in crate::server) fn router(inbound: Inbound) -> Router {
    Router::new()
        .route(DEVTOOLS_ROUTE, any(open_session))
        .fallback(not_found)
        .with_state(inbound)
}

async fn not_found(State(inbound): State<Inbound>, method: Method, uri: Uri) -> Response {
    info!(
        "rejecting non-debugging request: method={method}, path={}, peer_addr={:?}",
        uri.path(),
        inbound.peer_addr
    );
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response()
}

async fn open_session(
    State(inbound): State<Inbound>,
    Path((_kind, target)): Path<(String, String)>,
    uri: Uri,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Inbound {
        env,
        peer_addr,
        token,
        accepted,
    } = inbound;
    let config = &env.config;
    let context = match SessionContext::open(
        peer_addr,
        target,
        Arc::clone(config),
        Arc::clone(&env.registry),
        token,
    ) {
        Ok(context) => context,
        Err(e) => return failure(peer_addr, &e),
    };
    let peer = context.peer_label();
    context.info(format!("---------- connection from {peer} ----------"));

    let version = match check_version(&env.http, &config.remote, config.upstream_timeout).await {
        Ok(version) => version,
        Err(e) => return refuse(&context, &e),
    };
    context.info(format!(
        "endpoint {} reported: {}",
        config.remote,
        describe_version(&version)
    ));

    let path = uri.path_and_query().map_or(uri.path(), |p| p.as_str());
    let endpoint = upstream_endpoint(&config.remote, path);
    context.info(format!("connecting to {endpoint}"));
    let upstream = match dial(&endpoint, config.upstream_timeout).await {
        Ok(upstream) => upstream,
        Err(e) => return refuse(&context, &e),
    };
    context.info(format!("connected to {endpoint}"));

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            context.error(format!("could not upgrade connection on {peer}, got: {rejection}"));
            return rejection.into_response();
        }
    };
    context.info(format!("upgrading connection on {peer}"));
    upgrade
        .on_failed_upgrade(move |e| {
            debug!("client upgrade failed: error={e}, peer_addr={peer_addr:?}");
        })
        .on_upgrade(move |client| async move {
            let session = Accepted {
                context,
                client,
                upstream,
            };
            if accepted.send(session).await.is_err() {
                debug!("connection task gone before the session started: peer_addr={peer_addr:?}");
            }
        })
}

/// Report an upstream failure to the session log and answer with a 500.
fn refuse(context: &SessionContext, error: &dyn fmt::Display) -> Response {
    context.error(error.to_string());
    failure(context.peer(), error)
}

fn failure(peer_addr: Option<SocketAddr>, error: &dyn fmt::Display) -> Response {
    tracing::warn!(error = %error, ?peer_addr, "connection failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{error}\n")).into_response()
}
