//! Source session: flood timestamped frames at the client.
//!
//! Two tasks share the connection for the lifetime of the session: the
//! generator owns the write half and sends frames as fast as the transport
//! accepts them, while the watcher drains the read half solely to notice the
//! peer going away. They coordinate through a single atomic flag with one
//! writer (the watcher) and one reader (the generator); the awaited send is
//! the generator's only suspension point, so a disconnect is observed at
//! per-frame granularity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use crate::command::StreamCommand;
use crate::config::Config;
use crate::error::{Error, Result};

/// Length of the timestamp prefix in every frame.
pub const TIMESTAMP_LEN: usize = 8;

/// Microseconds since the Unix epoch.
fn unix_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Stamp the frame's 8-byte big-endian timestamp prefix.
fn stamp(frame: &mut [u8], micros: u64) {
    frame[..TIMESTAMP_LEN].copy_from_slice(&micros.to_be_bytes());
}

/// Run one source session.
///
/// Reads the initial `StreamCommand`, then sends binary frames of the
/// negotiated size until the watcher reports the peer gone or a send fails.
/// There is no success terminal state; the connection is closed when this
/// returns.
pub async fn run<S>(ws: WebSocketStream<S>, config: &Config) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut tx, mut rx) = ws.split();

    // A failed or non-JSON first message aborts the session before any
    // frame is sent; there is no retry. Control frames are not commands.
    let cmd = loop {
        match rx.next().await {
            Some(Ok(msg)) if msg.is_ping() || msg.is_pong() => continue,
            Some(Ok(msg)) => break StreamCommand::decode(&msg)?,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(Error::Decode("connection closed before command".to_string())),
        }
    };
    let size = cmd.normalized_size(config.max_message_size);
    debug!(?cmd, size, "source: command");

    // The client sends nothing further, so the watcher's read can only end
    // by the peer closing or the transport failing. Without it the
    // generator could keep writing into a dead socket until an OS-level
    // error surfaces much later.
    let stopped = Arc::new(AtomicBool::new(false));
    let watcher = tokio::spawn({
        let stopped = Arc::clone(&stopped);
        async move {
            loop {
                match rx.next().await {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            stopped.store(true, Ordering::Release);
        }
    });

    let mut frame = vec![0u8; size];
    while !stopped.load(Ordering::Acquire) {
        stamp(&mut frame, unix_micros());
        if let Err(e) = tx.send(Message::Binary(frame.clone())).await {
            debug!("source: send: {e}");
            break;
        }
    }

    watcher.abort();
    let _ = tx.close().await;
    Ok(())
}
