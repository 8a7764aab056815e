//! Source session control command.

use serde::Deserialize;

use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};

/// Frame size used when the client requests none.
pub const DEFAULT_MESSAGE_SIZE: usize = 100_000;

/// Smallest frame that still carries the 8-byte timestamp header plus a
/// non-empty payload.
pub const MIN_MESSAGE_SIZE: usize = 125;

/// Configuration sent by the client as the first message of a source session.
///
/// Wire field names are lowercase as emitted by the browser client; camel
/// case spellings are accepted for compatibility with clients that mirror
/// the command struct directly. Only `messagesize` influences streaming;
/// `download`, `messagecount` and `period` are decoded and ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamCommand {
    #[serde(alias = "Download")]
    pub download: String,

    #[serde(rename = "messagesize", alias = "messageSize", alias = "MessageSize")]
    pub message_size: usize,

    #[serde(rename = "messagecount", alias = "messageCount", alias = "MessageCount")]
    pub message_count: usize,

    #[serde(alias = "Period")]
    pub period: usize,
}

impl StreamCommand {
    /// Decode the initial control message.
    ///
    /// The command must arrive as a single text message holding a JSON
    /// object. Anything else aborts the session before streaming starts.
    pub fn decode(msg: &Message) -> Result<Self> {
        let text = match msg {
            Message::Text(text) => text,
            _ => return Err(Error::Decode("initial command is not text".to_string())),
        };
        serde_json::from_str(text).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Effective frame size after applying the default, floor and ceiling
    /// rules. Pure; `ceiling` is the configured largest message size.
    pub fn normalized_size(&self, ceiling: usize) -> usize {
        let size = match self.message_size {
            0 => DEFAULT_MESSAGE_SIZE,
            s => s,
        };
        size.clamp(MIN_MESSAGE_SIZE, ceiling.max(MIN_MESSAGE_SIZE))
    }
}
