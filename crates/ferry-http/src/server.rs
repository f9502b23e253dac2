//! HTTP server hosting a [`Service`] on hyper.
//!
//! Each accepted connection gets its own tokio task driving a hyper HTTP/1.1
//! connection. Each request on it is handed to [`handler::serve`] in a task of
//! its own, which writes the response through a [`HyperSink`].

use std::convert::Infallible;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::context::Context;
use crate::handler;
use crate::service::{Request, Service};
use crate::severity::{copy_error_severity, event_at};
use crate::sink::{HyperSink, ResponseBody, ResponseSink};

/// HTTP server for a single [`Service`].
pub struct HttpServer {
    config: ServerConfig,
    service: Service,
}

impl HttpServer {
    /// Create a server that will host `service` with the given settings.
    pub fn new(config: ServerConfig, service: Service) -> Self {
        Self { config, service }
    }

    /// The settings this server was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind `config.listen` and serve until `shutdown` flips.
    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.listen)
            .await
            .with_context(|| format!("failed to bind {}", self.config.listen))?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serve connections from an already bound listener until `shutdown`
    /// flips. Connections in flight are left to finish on their own.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let addr = listener.local_addr().context("listener has no address")?;
        let builder = self.connection_builder();
        info!(%addr, "HTTP server listening");

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, peer_addr) = accept_result.context("accept failed")?;
                    tokio::spawn(serve_connection(
                        builder.clone(),
                        stream,
                        peer_addr,
                        self.service.clone(),
                    ));
                }
                _ = shutdown.changed() => {
                    info!("HTTP server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    fn connection_builder(&self) -> http1::Builder {
        let mut builder = http1::Builder::new();
        builder
            .keep_alive(self.config.keep_alive)
            .max_buf_size(self.config.max_header_bytes);
        if let Some(timeout) = self.config.header_read_timeout() {
            builder.timer(TokioTimer::new()).header_read_timeout(timeout);
        }
        builder
    }
}

async fn serve_connection(
    builder: http1::Builder,
    stream: TcpStream,
    peer_addr: SocketAddr,
    service: Service,
) {
    let (closed_tx, closed_rx) = watch::channel(false);
    let (outcome_tx, outcome_rx) = watch::channel(None::<Arc<dyn StdError + Send + Sync>>);

    let svc = service_fn(move |req: hyper::Request<Incoming>| {
        let service = service.clone();
        let (sink, head) = HyperSink::new(outcome_rx.clone());
        let (request_done, request_cancel) = watch::channel(false);
        let context = Context::new(request_cancel).with_peer_addr(peer_addr);
        let req = Request::new(context, req.map(BodyExt::boxed_unsync));
        let connection_closed = closed_rx.clone();

        async move {
            tokio::spawn(run_request(service, req, sink, request_done, connection_closed));
            match head.await {
                Ok(rsp) => Ok::<_, Infallible>(rsp),
                Err(_) => {
                    error!(%peer_addr, "handler finished without a response head");
                    Ok(internal_error())
                }
            }
        }
    });

    let io = TokioIo::new(stream);
    let result = builder.serve_connection(io, svc).await;
    closed_tx.send_replace(true);

    match result {
        Ok(()) => debug!(%peer_addr, "connection closed"),
        Err(e) => {
            event_at!(copy_error_severity(&e), %peer_addr, error = %e, "connection error");
            outcome_tx.send_replace(Some(Arc::new(e)));
        }
    }
}

/// Run the adapter for one request. The request's context is cancelled as
/// soon as the connection ends or the response has been written, whichever
/// comes first.
async fn run_request<S: ResponseSink>(
    service: Service,
    req: Request,
    sink: S,
    request_done: watch::Sender<bool>,
    connection_closed: watch::Receiver<bool>,
) {
    let serve = handler::serve(service, req, sink);
    tokio::pin!(serve);

    let connection_ended = tokio::select! {
        _ = &mut serve => false,
        _ = closed(connection_closed) => true,
    };
    request_done.send_replace(true);
    if connection_ended {
        // Let the handler observe the failed copy and log it.
        serve.await;
    }
}

/// Resolves once the connection signal fires or its sender is gone.
async fn closed(mut connection_closed: watch::Receiver<bool>) {
    let _ = connection_closed.wait_for(|closed| *closed).await;
}

fn internal_error() -> hyper::Response<ResponseBody> {
    let mut rsp = hyper::Response::new(Empty::<Bytes>::new().boxed_unsync());
    *rsp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    rsp
}
