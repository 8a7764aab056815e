//! HTTP server: accept loop, routing, WebSocket upgrade, admission control.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::response::Response;
use crate::{ip, sink, source};

/// Streaming session flavors served over an upgraded connection.
#[derive(Debug, Clone, Copy)]
enum Session {
    Source,
    Sink,
}

impl Session {
    fn name(self) -> &'static str {
        match self {
            Session::Source => "source",
            Session::Sink => "sink",
        }
    }
}

/// State shared by all connections: the immutable configuration and the
/// active-session count used for admission control.
struct ServerState {
    config: Config,
    active: AtomicUsize,
}

/// RAII slot in the session limit; freed when the session task finishes.
struct SessionSlot(Arc<ServerState>);

impl SessionSlot {
    fn acquire(state: &Arc<ServerState>) -> Option<Self> {
        let max = state.config.max_sessions;
        state
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| Self(Arc::clone(state)))
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Measurement server.
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl Server {
    /// Bind to the configured address.
    pub async fn bind(config: Config) -> Result<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        Ok(Self {
            listener,
            state: Arc::new(ServerState {
                config,
                active: AtomicUsize::new(0),
            }),
        })
    }

    /// Get bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve requests until the process is terminated.
    pub async fn serve(self) -> Result<()> {
        info!("listening on {}", self.listener.local_addr()?);

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req: Request<Incoming>| {
                    let state = Arc::clone(&state);
                    async move { Ok::<_, Infallible>(route(req, peer, &state).into_hyper()) }
                });

                let result = http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await;

                if let Err(e) = result {
                    debug!("connection error: {e}");
                }
            });
        }
    }
}

fn route(req: Request<Incoming>, peer: SocketAddr, state: &Arc<ServerState>) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (method, path.as_str()) {
        (Method::GET, "/speedtest/source") => open_session(req, state, Session::Source),
        (Method::GET, "/speedtest/sink") => open_session(req, state, Session::Sink),
        (method, "/speedtest/ip") => {
            ip::handle(&method, req.headers(), peer, state.config.xff_headers)
        }
        (_, path) => Response::not_found().json(&serde_json::json!({
            "error": "not found",
            "path": path,
        })),
    }
}

/// Upgrade the request to a WebSocket and spawn the session task. The 101
/// response is produced here; hyper completes the switch after it is sent.
fn open_session(mut req: Request<Incoming>, state: &Arc<ServerState>, kind: Session) -> Response {
    let Some(accept_key) = websocket_accept(&req) else {
        return Response::bad_request().json(&serde_json::json!({
            "error": "websocket upgrade required",
        }));
    };

    // Admission control happens before the upgrade completes, so a refused
    // client never gets a half-open streaming session.
    let Some(slot) = SessionSlot::acquire(state) else {
        warn!("{}: session limit reached, refusing", kind.name());
        return Response::service_unavailable().json(&serde_json::json!({
            "error": "too many sessions",
        }));
    };

    let config = state.config.clone();
    tokio::spawn(async move {
        let _slot = slot;
        match hyper::upgrade::on(&mut req).await {
            Ok(upgraded) => {
                let ws = WebSocketStream::from_raw_socket(
                    TokioIo::new(upgraded),
                    Role::Server,
                    Some(ws_config(&config)),
                )
                .await;
                let result = match kind {
                    Session::Source => source::run(ws, &config).await,
                    Session::Sink => sink::run(ws).await,
                };
                match result {
                    Ok(()) => debug!("{}: session closed", kind.name()),
                    Err(e) => warn!("{}: session ended: {e}", kind.name()),
                }
            }
            Err(e) => warn!("{}: upgrade: {e}", kind.name()),
        }
    });

    Response::switching_protocols(&accept_key)
}

/// Validate the WebSocket handshake headers and derive the accept key.
fn websocket_accept<B>(req: &Request<B>) -> Option<String> {
    let headers = req.headers();
    let connection_upgrade = headers
        .get(http::header::CONNECTION)?
        .to_str()
        .ok()?
        .to_ascii_lowercase()
        .contains("upgrade");
    let websocket = headers
        .get(http::header::UPGRADE)?
        .to_str()
        .ok()?
        .eq_ignore_ascii_case("websocket");
    let version = headers
        .get(http::header::SEC_WEBSOCKET_VERSION)?
        .to_str()
        .ok()?
        == "13";
    if !(connection_upgrade && websocket && version) {
        return None;
    }
    let key = headers.get(http::header::SEC_WEBSOCKET_KEY)?;
    Some(derive_accept_key(key.as_bytes()))
}

/// Per-connection transport limits; this is the only inbound size ceiling.
fn ws_config(config: &Config) -> WebSocketConfig {
    let mut ws = WebSocketConfig::default();
    ws.max_message_size = Some(config.max_message_size.max(crate::command::MIN_MESSAGE_SIZE));
    ws.max_frame_size = Some(config.max_message_size.max(crate::command::MIN_MESSAGE_SIZE));
    ws
}
