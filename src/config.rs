//! Server configuration and CLI parsing.

use std::net::SocketAddr;

use clap::Parser;

use crate::error::{Error, Result};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "netgauge", version, about = "Network throughput and latency measurement server")]
struct Args {
    /// Address to listen on, either `addr:port` or a bare port
    #[arg(short, long, default_value = "0.0.0.0:4000")]
    listen: String,

    /// Maximum number of concurrently active streaming sessions
    #[arg(long, default_value_t = 64)]
    max_sessions: usize,

    /// Largest message accepted or generated, in bytes
    #[arg(long, default_value_t = 1_000_000)]
    max_message_size: usize,

    /// Trust X-Forwarded-For/X-Real-Ip/Forwarded headers for /speedtest/ip
    #[arg(long)]
    xff_headers: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log: String,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address.
    pub listen: SocketAddr,
    /// Ceiling on concurrently active source/sink sessions.
    pub max_sessions: usize,
    /// Ceiling on message size, both for inbound sink uploads and for the
    /// negotiated source frame size.
    pub max_message_size: usize,
    /// Trust forwarded-address headers on the address report endpoint.
    pub xff_headers: bool,
    /// Default log filter.
    pub log_level: String,
}

impl Config {
    /// Load configuration from command-line arguments.
    pub fn load() -> Result<Self> {
        let args = Args::parse();
        Ok(Self {
            listen: parse_listen(&args.listen)?,
            max_sessions: args.max_sessions,
            max_message_size: args.max_message_size,
            xff_headers: args.xff_headers,
            log_level: args.log,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 4000)),
            max_sessions: 64,
            max_message_size: 1_000_000,
            xff_headers: false,
            log_level: "info".to_string(),
        }
    }
}

/// Parse a listen address. A bare port binds the wildcard address.
fn parse_listen(s: &str) -> Result<SocketAddr> {
    if let Ok(port) = s.parse::<u16>() {
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    s.parse().map_err(|_| Error::InvalidAddr(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listen_full_addr() {
        let addr = parse_listen("127.0.0.1:9000").unwrap();
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
    }

    #[test]
    fn test_parse_listen_bare_port() {
        let addr = parse_listen("4000").unwrap();
        assert_eq!(addr, SocketAddr::from(([0, 0, 0, 0], 4000)));
    }

    #[test]
    fn test_parse_listen_invalid() {
        assert!(matches!(parse_listen("nonsense"), Err(Error::InvalidAddr(_))));
    }
}
