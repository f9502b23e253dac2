//! Test doubles shared by the unit tests.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use http::{HeaderMap, StatusCode};
use tokio::io::AsyncWrite;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, Layer};

use crate::error::TransportError;
use crate::sink::{Framing, ResponseSink};

/// Everything a [`RecordingSink`] observed.
#[derive(Debug, Default)]
pub(crate) struct Recorded {
    pub status: Option<StatusCode>,
    pub framing: Option<Framing>,
    pub headers: HeaderMap,
    pub head_writes: usize,
    pub body: Vec<u8>,
    pub writes: usize,
    pub flushes: usize,
    /// Body length at each flush.
    pub flushed_at: Vec<usize>,
}

type Failure = (usize, fn() -> io::Error);

/// In-memory [`ResponseSink`] with optional failure injection.
pub(crate) struct RecordingSink {
    state: Arc<Mutex<Recorded>>,
    headers: HeaderMap,
    fail_write: Option<Failure>,
    fail_flush: Option<Failure>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            headers: HeaderMap::new(),
            fail_write: None,
            fail_flush: None,
        }
    }

    /// Fail the `nth` write (1-based) with `err()`.
    pub fn fail_on_write(mut self, nth: usize, err: fn() -> io::Error) -> Self {
        self.fail_write = Some((nth, err));
        self
    }

    /// Fail the `nth` flush (1-based) with `err()`.
    pub fn fail_on_flush(mut self, nth: usize, err: fn() -> io::Error) -> Self {
        self.fail_flush = Some((nth, err));
        self
    }

    pub fn state(&self) -> MutexGuard<'_, Recorded> {
        self.state.lock().unwrap()
    }

    /// Shared handle that outlives the sink once it is moved away.
    pub fn handle(&self) -> Arc<Mutex<Recorded>> {
        self.state.clone()
    }
}

fn injected(failure: Option<Failure>, count: usize) -> Option<io::Error> {
    failure.and_then(|(nth, err)| (nth == count).then(err))
}

impl ResponseSink for RecordingSink {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode, framing: Framing) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.head_writes += 1;
        if state.status.is_some() {
            return Err(TransportError::HeadAlreadySent.into_io());
        }
        state.status = Some(status);
        state.framing = Some(framing);
        state.headers = self.headers.clone();
        Ok(())
    }
}

impl AsyncWrite for RecordingSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let mut state = this.state.lock().unwrap();
        state.writes += 1;
        if let Some(err) = injected(this.fail_write, state.writes) {
            return Poll::Ready(Err(err));
        }
        state.body.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let mut state = this.state.lock().unwrap();
        state.flushes += 1;
        if let Some(err) = injected(this.fail_flush, state.flushes) {
            return Poll::Ready(Err(err));
        }
        let len = state.body.len();
        state.flushed_at.push(len);
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// One captured `tracing` event.
#[derive(Debug, Clone)]
pub(crate) struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// `tracing` layer that records every event.
#[derive(Clone, Default)]
pub(crate) struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureLayer {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }
}

struct EventVisitor<'a>(&'a mut CapturedEvent);

impl Visit for EventVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{value:?}");
        if field.name() == "message" {
            self.0.message = value;
        } else {
            self.0.fields.push((field.name().to_string(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let mut captured = CapturedEvent {
            level: *event.metadata().level(),
            message: String::new(),
            fields: Vec::new(),
        };
        event.record(&mut EventVisitor(&mut captured));
        self.events.lock().unwrap().push(captured);
    }
}

/// Install a capturing subscriber for the current thread.
pub(crate) fn capture_events() -> (CaptureLayer, tracing::subscriber::DefaultGuard) {
    use tracing_subscriber::layer::SubscriberExt;

    let layer = CaptureLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (layer, guard)
}
