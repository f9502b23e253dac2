//! ferry-http runs request/response services on a hyper HTTP server.
//!
//! A [`Service`] turns a [`Request`] into a [`Response`]. The handler
//! adapter writes that response to the wire, choosing the transfer
//! discipline per response:
//!
//! ```text
//! hyper connection
//!   │
//!   ▼
//! handler::serve
//!   ├── invoke the service
//!   ├── copy headers (minus Content-Length) and write the head
//!   ├── detect::is_streaming ──► copy_chunked  (flush per unit)
//!   │                       └──► copy_buffered (single flush)
//!   └── classify and log copy failures (severity)
//! ```
//!
//! Client disconnects in the middle of a body are expected; the severity
//! classifier unwraps transport errors down to the OS error code so they are
//! logged below warning level.

pub mod body;
pub mod config;
pub mod context;
pub mod copy;
pub mod detect;
pub mod error;
pub mod handler;
pub mod server;
pub mod service;
pub mod severity;
pub mod sink;

#[cfg(test)]
mod testing;

pub use body::{Body, CHUNK_THRESHOLD, StreamWriter, Streamer};
pub use config::ServerConfig;
pub use context::Context;
pub use error::{ConfigError, CopyError, StreamClosed, TransportError};
pub use server::HttpServer;
pub use service::{Request, Response, Service, service_fn};
pub use severity::{Severity, copy_error_severity};
pub use sink::{Framing, HyperSink, ResponseSink};
