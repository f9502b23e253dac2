//! ferryd: serves a demonstration service over ferry-http.
//!
//! # Usage
//!
//! ```text
//! ferryd serve --config ferry.toml --listen 0.0.0.0:8080
//! ```
//!
//! Routes:
//! - `/stream`: streams a line per tick until done or the client leaves
//! - `/echo`: echoes the request body
//! - anything else: a short greeting

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use http_body_util::BodyExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use ferry_http::{Body, HttpServer, Request, Response, ServerConfig, Service, service_fn};

const TICKS: u32 = 10;
const TICK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "ferryd", about = "Ferry HTTP daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the demonstration service.
    Serve {
        /// Path to a ferry.toml; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the listen address from the config file.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ferryd=debug,ferry_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, listen } => run_serve(config, listen).await,
    }
}

async fn run_serve(config_path: Option<PathBuf>, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    let mut config = match &config_path {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = listen {
        config.listen = listen;
    }
    info!(config = ?config_path, listen = %config.listen, "ferryd starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown signal received");
        shutdown_tx.send_replace(true);
    });

    HttpServer::new(config, demo_service()).serve(shutdown_rx).await?;
    info!("ferryd stopped");
    Ok(())
}

fn demo_service() -> Service {
    service_fn(|req: Request| async move {
        let path = req.uri().path().to_owned();
        match path.as_str() {
            "/stream" => ticker(req),
            "/echo" => echo(req).await,
            _ => Response::ok("hello from ferryd\n")
                .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain")),
        }
    })
}

fn ticker(req: Request) -> Response {
    let ctx = req.context().clone();
    let (writer, body) = Body::streamer();

    tokio::spawn(async move {
        for tick in 0..TICKS {
            if writer.send(format!("tick {tick}\n")).await.is_err() {
                debug!(tick, "stream reader gone");
                return;
            }
            tokio::select! {
                _ = ctx.cancelled() => {
                    debug!(tick, "request cancelled");
                    return;
                }
                _ = tokio::time::sleep(TICK_INTERVAL) => {}
            }
        }
    });

    Response::new(StatusCode::OK)
        .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
        .with_body(body)
}

async fn echo(req: Request) -> Response {
    let content_type = req.headers().get(CONTENT_TYPE).cloned();
    match req.into_http().into_body().collect().await {
        Ok(collected) => {
            let body: Bytes = collected.to_bytes();
            let rsp = Response::ok(body);
            match content_type {
                Some(value) => rsp.with_header(CONTENT_TYPE, value),
                None => rsp,
            }
        }
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            Response::new(StatusCode::BAD_REQUEST)
        }
    }
}
