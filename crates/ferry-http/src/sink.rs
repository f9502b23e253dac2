//! Response sinks: where the handler writes status, headers and body bytes.
//!
//! [`ResponseSink`] is the host transport seam. [`HyperSink`] implements it
//! on top of hyper 1: the head goes to hyper through a oneshot, body bytes
//! are buffered and each flush hands one data frame to hyper over a bounded
//! channel. hyper decides the wire framing from [`Framing`].

use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use bytes::{Bytes, BytesMut};
use futures::channel::mpsc;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, HeaderValue, StatusCode};
use hyper::body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, StreamBody};
use tokio::io::AsyncWrite;
use tokio::sync::{oneshot, watch};

use crate::error::TransportError;

/// Largest data frame a [`HyperSink`] buffers before sending.
pub const MAX_FRAME_SIZE: usize = 16 * 1024;

/// Body type handed to hyper.
pub type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// Terminal error of a connection, published once the connection ends.
pub type ConnectionOutcome = watch::Receiver<Option<Arc<dyn StdError + Send + Sync>>>;

/// How the host frames the body on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No body follows.
    Empty,
    /// Exactly this many bytes follow; the host writes `Content-Length`.
    Length(u64),
    /// Length unknown; the host uses chunked transfer coding.
    Chunked,
}

/// Writable response destination supplied by the host transport.
pub trait ResponseSink: AsyncWrite + Send + Unpin {
    /// Headers sent along with [`write_head`](Self::write_head).
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Send the status line and headers. Must happen exactly once, before
    /// any body byte.
    fn write_head(&mut self, status: StatusCode, framing: Framing) -> io::Result<()>;

    /// Attach the transport's underlying cause to a sink failure.
    fn diagnose(&mut self, err: io::Error) -> impl Future<Output = io::Error> + Send {
        async move { err }
    }
}

type FrameSender = mpsc::Sender<Result<Frame<Bytes>, Infallible>>;

/// [`ResponseSink`] feeding a hyper server connection.
pub struct HyperSink {
    head: Option<oneshot::Sender<hyper::Response<ResponseBody>>>,
    headers: HeaderMap,
    frames: Option<FrameSender>,
    pending: BytesMut,
    outcome: ConnectionOutcome,
}

impl HyperSink {
    /// Create a sink and the receiver that yields its response head.
    pub fn new(outcome: ConnectionOutcome) -> (Self, oneshot::Receiver<hyper::Response<ResponseBody>>) {
        let (tx, rx) = oneshot::channel();
        let sink = Self {
            head: Some(tx),
            headers: HeaderMap::new(),
            frames: None,
            pending: BytesMut::new(),
            outcome,
        };
        (sink, rx)
    }

    fn channel_body(&mut self) -> ResponseBody {
        let (tx, rx) = mpsc::channel(1);
        self.frames = Some(tx);
        StreamBody::new(rx).boxed_unsync()
    }

    fn poll_send_pending(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.pending.is_empty() {
            return Poll::Ready(Ok(()));
        }
        let Some(frames) = self.frames.as_mut() else {
            return Poll::Ready(Err(TransportError::HeadNotSent.into_io()));
        };

        ready!(frames.poll_ready(cx)).map_err(|_| TransportError::BodyDropped.into_io())?;
        let chunk = self.pending.split().freeze();
        frames
            .start_send(Ok(Frame::data(chunk)))
            .map_err(|_| TransportError::BodyDropped.into_io())?;
        Poll::Ready(Ok(()))
    }
}

impl ResponseSink for HyperSink {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_head(&mut self, status: StatusCode, framing: Framing) -> io::Result<()> {
        let head = self
            .head
            .take()
            .ok_or_else(|| TransportError::HeadAlreadySent.into_io())?;

        let body = match framing {
            Framing::Empty => Empty::<Bytes>::new().boxed_unsync(),
            Framing::Length(len) => {
                self.headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
                self.channel_body()
            }
            Framing::Chunked => self.channel_body(),
        };

        let mut rsp = hyper::Response::new(body);
        *rsp.status_mut() = status;
        *rsp.headers_mut() = std::mem::take(&mut self.headers);

        head.send(rsp)
            .map_err(|_| TransportError::BodyDropped.into_io())
    }

    async fn diagnose(&mut self, err: io::Error) -> io::Error {
        let dropped = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<TransportError>())
            .is_some_and(|e| matches!(e, TransportError::BodyDropped));
        if !dropped {
            return err;
        }

        // hyper drops the body when its connection fails; the connection
        // task publishes why once it has finished.
        let mut outcome = self.outcome.clone();
        let cause = match outcome.wait_for(Option::is_some).await {
            Ok(published) => published.clone(),
            Err(_) => None,
        };
        match cause {
            Some(cause) => TransportError::Connection(cause).into_io(),
            None => err,
        }
    }
}

impl AsyncWrite for HyperSink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.pending.len() >= MAX_FRAME_SIZE {
            ready!(this.poll_send_pending(cx))?;
        }
        let n = buf.len().min(MAX_FRAME_SIZE - this.pending.len());
        this.pending.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().poll_send_pending(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_send_pending(cx))?;
        // Dropping the sender ends the body stream.
        this.frames = None;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    fn idle_outcome() -> (watch::Sender<Option<Arc<dyn StdError + Send + Sync>>>, ConnectionOutcome) {
        watch::channel(None)
    }

    #[tokio::test]
    async fn length_framing_sets_content_length() {
        let (_tx, outcome) = idle_outcome();
        let (mut sink, head) = HyperSink::new(outcome);
        sink.headers_mut()
            .insert("x-test", HeaderValue::from_static("1"));
        sink.write_head(StatusCode::OK, Framing::Length(5)).unwrap();

        sink.write_all(b"hello").await.unwrap();
        sink.shutdown().await.unwrap();
        drop(sink);

        let rsp = head.await.unwrap();
        assert_eq!(rsp.status(), StatusCode::OK);
        assert_eq!(rsp.headers()[CONTENT_LENGTH], "5");
        assert_eq!(rsp.headers()["x-test"], "1");
        let body = rsp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn each_flush_is_one_frame() {
        let (_tx, outcome) = idle_outcome();
        let (mut sink, head) = HyperSink::new(outcome);
        sink.write_head(StatusCode::OK, Framing::Chunked).unwrap();
        let mut body = head.await.unwrap().into_body();

        for part in ["a", "b", "c"] {
            sink.write_all(part.as_bytes()).await.unwrap();
            sink.flush().await.unwrap();
            let frame = body.frame().await.unwrap().unwrap();
            assert_eq!(frame.into_data().unwrap(), part);
        }
        drop(sink);
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn empty_framing_has_no_body() {
        let (_tx, outcome) = idle_outcome();
        let (mut sink, head) = HyperSink::new(outcome);
        sink.write_head(StatusCode::NO_CONTENT, Framing::Empty).unwrap();

        let rsp = head.await.unwrap();
        assert_eq!(rsp.status(), StatusCode::NO_CONTENT);
        assert!(rsp.headers().get(CONTENT_LENGTH).is_none());
        assert!(rsp.into_body().frame().await.is_none());
    }

    #[tokio::test]
    async fn head_is_sent_once() {
        let (_tx, outcome) = idle_outcome();
        let (mut sink, _head) = HyperSink::new(outcome);
        sink.write_head(StatusCode::OK, Framing::Empty).unwrap();
        assert!(sink.write_head(StatusCode::OK, Framing::Empty).is_err());
    }

    #[tokio::test]
    async fn body_before_head_fails() {
        let (_tx, outcome) = idle_outcome();
        let (mut sink, _head) = HyperSink::new(outcome);
        sink.write_all(b"early").await.unwrap();
        let err = sink.flush().await.unwrap_err();
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<TransportError>());
        assert!(matches!(inner, Some(TransportError::HeadNotSent)));
    }

    #[tokio::test]
    async fn dropped_body_is_diagnosed_with_connection_error() {
        let (tx, outcome) = idle_outcome();
        let (mut sink, head) = HyperSink::new(outcome);
        sink.write_head(StatusCode::OK, Framing::Chunked).unwrap();
        drop(head.await.unwrap());

        sink.write_all(b"lost").await.unwrap();
        let err = sink.flush().await.unwrap_err();

        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        tx.send_replace(Some(Arc::new(reset)));
        let diagnosed = sink.diagnose(err).await;

        let inner = diagnosed
            .get_ref()
            .and_then(|e| e.downcast_ref::<TransportError>());
        assert!(matches!(inner, Some(TransportError::Connection(_))));
    }

    #[tokio::test]
    async fn clean_connection_end_keeps_original_error() {
        let (tx, outcome) = idle_outcome();
        let (mut sink, head) = HyperSink::new(outcome);
        sink.write_head(StatusCode::OK, Framing::Chunked).unwrap();
        drop(head.await.unwrap());
        drop(tx);

        sink.write_all(b"lost").await.unwrap();
        let err = sink.flush().await.unwrap_err();
        let diagnosed = sink.diagnose(err).await;

        let inner = diagnosed
            .get_ref()
            .and_then(|e| e.downcast_ref::<TransportError>());
        assert!(matches!(inner, Some(TransportError::BodyDropped)));
    }

    #[tokio::test]
    async fn unrelated_errors_pass_through_diagnose() {
        let (_tx, outcome) = idle_outcome();
        let (mut sink, _head) = HyperSink::new(outcome);
        let err = sink
            .diagnose(io::Error::from(io::ErrorKind::TimedOut))
            .await;
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
