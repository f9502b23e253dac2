//! Handler adapter: runs a [`Service`] for one request and writes its
//! response to a [`ResponseSink`].
//!
//! Runs sequentially within the caller's task. Body transmission errors are
//! terminal for the request: the status line is already out, so they are
//! classified and logged, never retried or propagated.

use http::header::{CONTENT_LENGTH, HeaderName};
use http::HeaderMap;

use crate::copy::{copy_buffered, copy_chunked};
use crate::detect::is_streaming;
use crate::service::{Request, Response, Service};
use crate::severity::{copy_error_severity, event_at};
use crate::sink::{Framing, ResponseSink};

/// Serve one request: invoke `service`, then write its response to `sink`.
pub async fn serve<S: ResponseSink>(service: Service, req: Request, mut sink: S) {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let peer = req.context().peer_addr();

    let mut rsp = service(req).await;

    copy_headers(&rsp.headers, sink.headers_mut());

    let streaming = is_streaming(&rsp);
    let framing = framing_for(&rsp, streaming);
    if let Err(err) = sink.write_head(rsp.status, framing) {
        let err = sink.diagnose(err).await;
        event_at!(
            copy_error_severity(&err),
            %method, %uri, ?peer, error = %err,
            "couldn't send response head"
        );
        return;
    }

    let Some(mut body) = rsp.body.take() else {
        return;
    };

    let (result, kind) = if streaming {
        (copy_chunked(&mut sink, &mut body).await, "streaming ")
    } else {
        (copy_buffered(&mut sink, &mut body).await, "")
    };
    drop(body);

    if let Err(err) = result {
        let written = err.written;
        let source = sink.diagnose(err.source).await;
        event_at!(
            copy_error_severity(&source),
            %method, %uri, ?peer, written, error = %source,
            "couldn't send {kind}response body"
        );
    }
}

/// Headers the host computes itself and that must not be copied over.
fn is_host_computed(name: &HeaderName) -> bool {
    name == CONTENT_LENGTH
}

/// Copy response headers into the outgoing set, replacing any values the
/// sink already holds under the same name.
fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for name in from.keys() {
        if is_host_computed(name) {
            continue;
        }
        to.remove(name);
        for value in from.get_all(name) {
            to.append(name.clone(), value.clone());
        }
    }
}

fn framing_for(rsp: &Response, streaming: bool) -> Framing {
    match &rsp.body {
        None => Framing::Empty,
        Some(_) if streaming => Framing::Chunked,
        Some(body) => body.known_len().map_or(Framing::Chunked, Framing::Length),
    }
}
