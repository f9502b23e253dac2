//! Severity classification for body transmission errors.
//!
//! A failure while sending a response body usually means the client went
//! away (closed the tab, timed out, reset the connection). Those are not
//! server faults, so they are reported below the default `Warn` level.
//!
//! Transport errors arrive wrapped several layers deep, e.g.
//! `io::Error(BrokenPipe) -> TransportError::Connection -> hyper::Error ->
//! io::Error(ECONNRESET)`. Classification walks the chain through the known
//! wrapper shapes until it reaches a raw OS error code.

use std::error::Error as StdError;
use std::io;

use crate::error::TransportError;

/// Maximum number of wrapper layers unwrapped before giving up.
const MAX_UNWRAP_DEPTH: usize = 8;

/// How loudly a transmission error should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Severity {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl Severity {
    pub fn level(self) -> tracing::Level {
        match self {
            Severity::Debug => tracing::Level::DEBUG,
            Severity::Info => tracing::Level::INFO,
            Severity::Warn => tracing::Level::WARN,
            Severity::Error => tracing::Level::ERROR,
        }
    }
}

/// Emit a `tracing` event at a runtime-chosen [`Severity`].
macro_rules! event_at {
    ($severity:expr, $($arg:tt)+) => {
        match $severity {
            $crate::severity::Severity::Debug => ::tracing::debug!($($arg)+),
            $crate::severity::Severity::Info => ::tracing::info!($($arg)+),
            $crate::severity::Severity::Warn => ::tracing::warn!($($arg)+),
            $crate::severity::Severity::Error => ::tracing::error!($($arg)+),
        }
    };
}
pub(crate) use event_at;

/// Severity to use when reporting `err` from a body copy.
///
/// Never fails: any shape that is not a recognized wrapper, at any depth,
/// yields [`Severity::Warn`].
pub fn copy_error_severity(err: &(dyn StdError + 'static)) -> Severity {
    let mut current = err;
    for _ in 0..MAX_UNWRAP_DEPTH {
        let inner: Option<&(dyn StdError + 'static)> =
            if let Some(io_err) = current.downcast_ref::<io::Error>() {
                if let Some(code) = io_err.raw_os_error() {
                    return errno_severity(code);
                }
                io_err.get_ref().map(|e| e as &(dyn StdError + 'static))
            } else if let Some(transport) = current.downcast_ref::<TransportError>() {
                match transport {
                    TransportError::Connection(cause) => {
                        Some(&**cause as &(dyn StdError + 'static))
                    }
                    _ => None,
                }
            } else if let Some(hyper_err) = current.downcast_ref::<hyper::Error>() {
                hyper_err.source()
            } else {
                None
            };

        match inner {
            Some(next) => current = next,
            None => return Severity::Warn,
        }
    }
    Severity::Warn
}

/// Platform mapping from a raw OS error code to a severity.
#[cfg(unix)]
fn errno_severity(code: i32) -> Severity {
    match code {
        libc::EPIPE | libc::ECONNRESET | libc::ECONNABORTED => Severity::Debug,
        _ => Severity::Warn,
    }
}

#[cfg(windows)]
fn errno_severity(code: i32) -> Severity {
    const WSAECONNABORTED: i32 = 10053;
    const WSAECONNRESET: i32 = 10054;
    match code {
        WSAECONNABORTED | WSAECONNRESET => Severity::Debug,
        _ => Severity::Warn,
    }
}

#[cfg(not(any(unix, windows)))]
fn errno_severity(_code: i32) -> Severity {
    Severity::Warn
}
