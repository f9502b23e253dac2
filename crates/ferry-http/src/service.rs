//! The service abstraction: requests in, responses out.

use std::convert::Infallible;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::header::IntoHeaderName;
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty};

use crate::body::Body;
use crate::context::Context;

/// Body type of an inbound request.
pub type RequestBody = UnsyncBoxBody<Bytes, hyper::Error>;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A service turns one request into one response.
pub type Service = Arc<dyn Fn(Request) -> BoxFuture<Response> + Send + Sync>;

/// Build a [`Service`] from an async closure.
pub fn service_fn<F, Fut>(f: F) -> Service
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req: Request| -> BoxFuture<Response> { Box::pin(f(req)) })
}

/// A request body with no content.
pub fn empty_request_body() -> RequestBody {
    Empty::<Bytes>::new()
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

/// An inbound request together with its [`Context`].
///
/// Derefs to the wire-level `http::Request`. Dropping it releases the
/// inbound body.
#[derive(Debug)]
pub struct Request {
    context: Context,
    inner: http::Request<RequestBody>,
}

impl Request {
    /// Pair a wire-level request with its context.
    pub fn new(context: Context, inner: http::Request<RequestBody>) -> Self {
        Self { context, inner }
    }

    /// Cancellation context for this request.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Take the wire-level request, e.g. to consume its body.
    pub fn into_http(self) -> http::Request<RequestBody> {
        self.inner
    }
}

impl Deref for Request {
    type Target = http::Request<RequestBody>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for Request {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// A response produced by a [`Service`].
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Transfer codings promoted out of the header set by the transport,
    /// as found on proxied upstream responses.
    pub transfer_encoding: Vec<String>,
    pub body: Option<Body>,
}

impl Response {
    /// A response with the given status and no body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            transfer_encoding: Vec::new(),
            body: None,
        }
    }

    /// `200 OK` with the given body.
    pub fn ok(body: impl Into<Body>) -> Self {
        Self::new(StatusCode::OK).with_body(body)
    }

    /// Append a header value.
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Append a transfer coding to the promoted `transfer_encoding` field.
    pub fn with_transfer_encoding(mut self, coding: impl Into<String>) -> Self {
        self.transfer_encoding.push(coding.into());
        self
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}
