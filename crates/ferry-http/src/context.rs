//! Per-request cancellation context.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Cancellation and deadline information carried with a [`Request`](crate::Request).
///
/// The host flips the cancellation signal once the response has been
/// written or the underlying connection ends, whichever happens first.
/// Nothing in the adapter enforces the deadline; services and body
/// producers are expected to watch [`Context::cancelled`].
#[derive(Debug, Clone)]
pub struct Context {
    cancelled: watch::Receiver<bool>,
    deadline: Option<Instant>,
    peer_addr: Option<SocketAddr>,
}

impl Context {
    /// Context driven by the given cancellation signal.
    pub fn new(cancelled: watch::Receiver<bool>) -> Self {
        Self {
            cancelled,
            deadline: None,
            peer_addr: None,
        }
    }

    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(rx)
    }

    /// Add a deadline. An earlier existing deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Add a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Record the remote address of the connection.
    pub fn with_peer_addr(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }

    /// The earliest deadline set on this context, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Remote address of the connection, when served over TCP.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Whether the signal fired or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the context is cancelled. Never resolves for a
    /// background context.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.clone();
        let signal = async move {
            let source_dropped = rx.wait_for(|cancelled| *cancelled).await.is_err();
            if source_dropped {
                std::future::pending::<()>().await;
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = signal => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => signal.await,
        }
    }
}
