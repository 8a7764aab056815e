//! Remote address reporting.
//!
//! Stateless request/response endpoint telling the caller which network
//! address the server sees it as. When the connection arrives through a
//! reverse proxy the socket peer is the proxy, so the handler can fall back
//! to the `X-Forwarded-For`, `X-Real-Ip` and `Forwarded` headers.

use std::net::{IpAddr, SocketAddr};

use http::{HeaderMap, Method};
use serde::{Deserialize, Serialize};

use crate::response::Response;

/// Address report sent to the caller.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub remoteip: String,
    pub remoteport: String,
}

impl AddressRecord {
    fn unknown() -> Self {
        Self {
            remoteip: "unknown".to_string(),
            remoteport: "unknown".to_string(),
        }
    }

    fn from_addr(addr: SocketAddr) -> Self {
        Self {
            remoteip: canonical_ip(addr.ip()),
            // Forwarded headers may carry an address without a port.
            remoteport: match addr.port() {
                0 => "unknown".to_string(),
                p => p.to_string(),
            },
        }
    }

    /// Build a record from a textual peer address, substituting `"unknown"`
    /// for both fields when it does not parse.
    pub fn from_remote(remote: &str) -> Self {
        remote
            .parse::<SocketAddr>()
            .map(Self::from_addr)
            .unwrap_or_else(|_| Self::unknown())
    }
}

/// Handle a request on the address report route. The permissive CORS header
/// is set on every response, whatever the method.
pub(crate) fn handle(
    method: &Method,
    headers: &HeaderMap,
    peer: SocketAddr,
    trust_forwarded: bool,
) -> Response {
    match *method {
        Method::OPTIONS => Response::ok().cors(),
        Method::GET => {
            let record = AddressRecord::from_addr(client_addr(peer, headers, trust_forwarded));
            Response::ok().cors().json(&record)
        }
        _ => Response::forbidden().cors().text("403 Access denied"),
    }
}

/// Resolve the client address, consulting forwarded headers when the socket
/// peer is a loopback address (local reverse proxy) or when configured to
/// always trust them.
fn client_addr(peer: SocketAddr, headers: &HeaderMap, trust_forwarded: bool) -> SocketAddr {
    if !(trust_forwarded || peer.ip().is_loopback()) {
        return peer;
    }
    header_value(headers, "x-forwarded-for")
        .and_then(parse_addr_list)
        .or_else(|| header_value(headers, "x-real-ip").and_then(parse_addr_list))
        .or_else(|| header_value(headers, "forwarded").and_then(parse_forwarded))
        .unwrap_or(peer)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// First address of a comma-separated list, as `ip` or `ip:port`.
fn parse_addr_list(s: &str) -> Option<SocketAddr> {
    let first = s.split(',').next()?.trim();
    parse_addr(first)
}

/// First `for=` element of a `Forwarded` header.
fn parse_forwarded(s: &str) -> Option<SocketAddr> {
    let field = s.split(',').next()?.trim();
    field
        .split(';')
        .map(|s| s.trim().to_lowercase())
        .find(|s| s.starts_with("for="))
        .and_then(|s| parse_addr(s[4..].trim_matches('"')))
}

fn parse_addr(s: &str) -> Option<SocketAddr> {
    s.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, 0))
        .or_else(|_| s.parse::<SocketAddr>())
        .ok()
}

/// Report IPv4-mapped IPv6 addresses as plain IPv4.
fn canonical_ip(ip: IpAddr) -> String {
    if let IpAddr::V6(v6) = ip {
        if let Some(v4) = v6.to_ipv4_mapped() {
            return v4.to_string();
        }
    }
    ip.to_string()
}
