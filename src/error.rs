//! Error types for netgauge.

use std::io;

/// Result type for netgauge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Server errors.
///
/// Everything here is fatal to the session (or the process, for bind
/// failures) that produced it; no error crosses connection boundaries and
/// nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error (bind, accept).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] http::Error),

    /// Hyper error (connection serving, upgrade).
    #[error("hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    /// WebSocket send/receive error.
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed initial command on a source session.
    #[error("bad command: {0}")]
    Decode(String),

    /// Invalid listen address.
    #[error("invalid listen address: {0}")]
    InvalidAddr(String),
}
