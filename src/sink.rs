//! Sink session: measure client uploads.

use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use crate::error::Result;

/// Per-message measurement reported back to the uploading client.
#[derive(Debug, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Arrival time, milliseconds since the Unix epoch.
    pub timestamp: f64,
    /// Total payload bytes received.
    pub messagesize: usize,
}

/// Milliseconds since the Unix epoch.
fn unix_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
        * 1000.0
}

/// Run one sink session until the peer closes or the transport fails.
///
/// Every inbound binary message is answered with exactly one JSON text line
/// carrying its size and arrival time. Non-binary messages are ignored.
/// Message assembly happens in the connection's own transport buffer, so
/// concurrent sink sessions never share state.
pub async fn run<S>(mut ws: WebSocketStream<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("sink: start");
    while let Some(msg) = ws.next().await {
        let msg = msg?;
        match msg {
            Message::Binary(data) => {
                let record = MeasurementRecord {
                    timestamp: unix_millis(),
                    messagesize: data.len(),
                };
                let line = serde_json::to_string(&record)?;
                ws.send(Message::Text(line)).await?;
            }
            Message::Close(_) => break,
            // Control messages and text frames carry no payload to measure.
            _ => continue,
        }
    }
    debug!("sink: done");
    Ok(())
}
