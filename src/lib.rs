//! # netgauge
//!
//! Network throughput and latency measurement server over WebSocket.
//!
//! ## Features
//!
//! - **Source**: floods the client with timestamped binary frames at the
//!   maximum rate the transport accepts (download test)
//! - **Sink**: measures client uploads, answering every binary message with
//!   a JSON size/timestamp record (upload test)
//! - **Address report**: plain HTTP endpoint returning the caller's
//!   observed network address
//! - **Async**: tokio-based, one task per connection
//!
//! ## Example
//!
//! ```rust,ignore
//! use netgauge::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> netgauge::Result<()> {
//!     let server = Server::bind(Config::default()).await?;
//!     server.serve().await
//! }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod ip;
pub mod response;
pub mod server;
pub mod sink;
pub mod source;

pub use command::StreamCommand;
pub use config::Config;
pub use error::{Error, Result};
pub use ip::AddressRecord;
pub use response::Response;
pub use server::Server;
pub use sink::MeasurementRecord;
