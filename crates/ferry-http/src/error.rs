//! Error types for the ferry HTTP adapter.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Failures raised by a host response sink.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("response head already sent")]
    HeadAlreadySent,

    #[error("response body written before head")]
    HeadNotSent,

    #[error("response body receiver dropped")]
    BodyDropped,

    /// The connection carrying the response failed; holds the transport's
    /// own error so its cause chain stays reachable.
    #[error("connection closed with error")]
    Connection(#[source] Arc<dyn StdError + Send + Sync>),
}

impl TransportError {
    /// Wrap into an `io::Error` so it can travel through `AsyncWrite`.
    pub(crate) fn into_io(self) -> io::Error {
        let kind = match self {
            Self::HeadAlreadySent | Self::HeadNotSent => io::ErrorKind::Other,
            Self::BodyDropped | Self::Connection(_) => io::ErrorKind::BrokenPipe,
        };
        io::Error::new(kind, self)
    }
}

/// A body copy that stopped early.
#[derive(Debug, Error)]
#[error("body copy failed after {written} bytes: {source}")]
pub struct CopyError {
    /// Bytes that reached the sink before the failure.
    pub written: u64,
    #[source]
    pub source: io::Error,
}

/// Returned by [`StreamWriter`](crate::body::StreamWriter) once the reading
/// side has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stream closed by reader")]
pub struct StreamClosed;

/// Errors loading a [`ServerConfig`](crate::config::ServerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
