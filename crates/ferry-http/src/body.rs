//! Response bodies.
//!
//! A [`Body`] is either materialized bytes, an opaque reader, or a live
//! stream fed by a [`StreamWriter`]. All three are consumed through
//! `AsyncRead`, so the transmission path does not care where bytes come from.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

use crate::error::StreamClosed;

/// Byte threshold above which a materialized body is sent with chunked
/// encoding on the wire instead of a declared length.
pub const CHUNK_THRESHOLD: usize = 5 * 1_000_000;

/// Chunks a [`StreamWriter`] may queue before `send` waits for the reader.
const STREAM_QUEUE_DEPTH: usize = 8;

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// A response body.
pub enum Body {
    /// Fully materialized payload of known length.
    Bytes(Bytes),
    /// Opaque reader. Without a declared length the host picks the framing.
    Reader { reader: BoxReader, len: Option<u64> },
    /// Live stream whose total length is unknown when sending begins.
    Stream(Streamer),
}

impl Body {
    /// Build a body from materialized bytes, applying [`CHUNK_THRESHOLD`].
    ///
    /// Payloads larger than the threshold lose their declared length so the
    /// host transfers them chunked.
    pub fn buffered(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        if data.len() > CHUNK_THRESHOLD {
            Body::Reader {
                reader: Box::new(BytesReader(data)),
                len: None,
            }
        } else {
            Body::Bytes(data)
        }
    }

    /// Wrap an arbitrary reader, optionally declaring its length.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static, len: Option<u64>) -> Self {
        Body::Reader {
            reader: Box::new(reader),
            len,
        }
    }

    /// Create a live stream body and the writer that feeds it.
    pub fn streamer() -> (StreamWriter, Body) {
        let (tx, rx) = mpsc::channel(STREAM_QUEUE_DEPTH);
        (
            StreamWriter { tx },
            Body::Stream(Streamer {
                rx,
                current: Bytes::new(),
            }),
        )
    }

    /// Length known before transmission, if any.
    pub fn known_len(&self) -> Option<u64> {
        match self {
            Body::Bytes(data) => Some(data.len() as u64),
            Body::Reader { len, .. } => *len,
            Body::Stream(_) => None,
        }
    }

    /// Whether this is a live stream.
    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            Body::Reader { len, .. } => f.debug_struct("Reader").field("len", len).finish(),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl AsyncRead for Body {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Body::Bytes(data) => {
                read_from_bytes(data, buf);
                Poll::Ready(Ok(()))
            }
            Body::Reader { reader, .. } => Pin::new(reader).poll_read(cx, buf),
            Body::Stream(streamer) => Pin::new(streamer).poll_read(cx, buf),
        }
    }
}

impl From<Bytes> for Body {
    fn from(data: Bytes) -> Self {
        Body::buffered(data)
    }
}

impl From<Vec<u8>> for Body {
    fn from(data: Vec<u8>) -> Self {
        Body::buffered(data)
    }
}

impl From<String> for Body {
    fn from(data: String) -> Self {
        Body::buffered(data)
    }
}

impl From<&'static str> for Body {
    fn from(data: &'static str) -> Self {
        Body::buffered(data)
    }
}

fn read_from_bytes(data: &mut Bytes, buf: &mut ReadBuf<'_>) {
    let n = data.len().min(buf.remaining());
    buf.put_slice(&data[..n]);
    data.advance(n);
}

struct BytesReader(Bytes);

impl AsyncRead for BytesReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        read_from_bytes(&mut self.get_mut().0, buf);
        Poll::Ready(Ok(()))
    }
}

/// Reading half of a live stream body.
///
/// Each chunk handed to [`StreamWriter::send`] is delivered by its own read
/// (split only when the caller's buffer is smaller than the chunk). The
/// stream ends once every writer is dropped or closed.
pub struct Streamer {
    rx: mpsc::Receiver<Bytes>,
    current: Bytes,
}

impl AsyncRead for Streamer {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        while this.current.is_empty() {
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => this.current = chunk,
                // Writer gone: EOF.
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
        read_from_bytes(&mut this.current, buf);
        Poll::Ready(Ok(()))
    }
}

/// Writing half of a live stream body.
#[derive(Debug, Clone)]
pub struct StreamWriter {
    tx: mpsc::Sender<Bytes>,
}

impl StreamWriter {
    /// Queue a chunk, waiting while the reader is behind.
    ///
    /// Empty chunks are skipped so they cannot be mistaken for end of stream.
    pub async fn send(&self, chunk: impl Into<Bytes>) -> Result<(), StreamClosed> {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return if self.tx.is_closed() {
                Err(StreamClosed)
            } else {
                Ok(())
            };
        }
        self.tx.send(chunk).await.map_err(|_| StreamClosed)
    }

    /// Whether the reading side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// End the stream from this writer.
    pub fn close(self) {
        drop(self);
    }
}
