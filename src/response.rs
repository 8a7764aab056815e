//! HTTP response builder.

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::Full;

/// Minimal HTTP response with builder-style construction.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Create response with status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// 200 OK
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// 400 Bad Request
    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST)
    }

    /// 403 Forbidden
    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN)
    }

    /// 404 Not Found
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    /// 503 Service Unavailable
    pub fn service_unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE)
    }

    /// 101 Switching Protocols, with the WebSocket handshake headers.
    pub fn switching_protocols(accept_key: &str) -> Self {
        Self::new(StatusCode::SWITCHING_PROTOCOLS)
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-accept", accept_key)
    }

    /// Set header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (
            http::HeaderName::try_from(name),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
        self
    }

    /// Set body as text.
    pub fn text(self, text: impl Into<String>) -> Self {
        let mut resp = self.header("content-type", "text/plain; charset=utf-8");
        resp.body = Bytes::from(text.into());
        resp
    }

    /// Set body as JSON.
    pub fn json<T: serde::Serialize>(self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(json) => {
                let mut resp = self.header("content-type", "application/json");
                resp.body = Bytes::from(json);
                resp
            }
            Err(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR)
                .text("serialization failed"),
        }
    }

    /// Allow all origins.
    pub fn cors(self) -> Self {
        self.header("access-control-allow-origin", "*")
            .header("access-control-allow-methods", "GET, OPTIONS")
            .header("access-control-allow-headers", "Content-Type")
    }

    /// Get status code.
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Get body.
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Build hyper response.
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let mut builder = hyper::Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        builder.body(Full::new(self.body)).unwrap_or_else(|_| {
            hyper::Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::new()))
                .unwrap()
        })
    }
}
