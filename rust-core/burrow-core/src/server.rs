//! # HTTP Server
//!
//! HTTP/1 server built on Hyper and Tokio, driving an [`App`].
//!
//! ## Key Features
//!
//! - One task per accepted connection
//! - Request bodies collected up front, 413 over the configured limit
//! - Per-request timeout (408)
//! - Graceful shutdown on SIGINT/SIGTERM: idle keep-alive connections are
//!   closed, in-flight requests finish within a bounded drain

use crate::app::{payload_too_large, App};
use crate::context::Context;
use crate::error::{Error, Result};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpSocket;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// HTTP server for an [`App`]
#[derive(Debug, Clone)]
pub struct Server {
    app: Arc<App>,
}

impl Server {
    /// Wrap an application
    #[must_use]
    pub fn new(app: App) -> Self {
        Self { app: Arc::new(app) }
    }

    /// The served application
    #[must_use]
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Accept connections until SIGINT or SIGTERM, then drain
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the address cannot be bound, or the
    /// accept error that stopped the loop.
    pub async fn serve(&self) -> Result<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Accept connections until `signal` completes, then drain
    ///
    /// Open connections are told to close once their in-flight request is
    /// answered; idle keep-alive connections close right away. The drain is
    /// bounded by `shutdown_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the address cannot be bound, or the
    /// accept error that stopped the loop.
    pub async fn serve_with_shutdown<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let config = self.app.config();
        let addr = config.address()?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr).map_err(|source| Error::BindError {
            address: addr.to_string(),
            source,
        })?;
        let listener = socket.listen(1024)?;

        info!(
            address = %addr,
            routes = self.app.routes().len(),
            "Server listening on http://{}",
            addr
        );

        let active = Arc::new(AtomicUsize::new(0));
        let keep_alive = config.keep_alive;
        let (closing_tx, closing_rx) = watch::channel(false);

        tokio::pin!(signal);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);
                    let app = Arc::clone(&self.app);
                    let active = Arc::clone(&active);
                    let mut closing = closing_rx.clone();

                    active.fetch_add(1, Ordering::Relaxed);
                    tokio::task::spawn(async move {
                        let service = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { handle_request(req, &app, remote_addr).await }
                        });

                        let conn = http1::Builder::new()
                            .keep_alive(keep_alive)
                            .serve_connection(io, service);
                        tokio::pin!(conn);

                        let result = tokio::select! {
                            result = conn.as_mut() => result,
                            _ = closing.changed() => {
                                conn.as_mut().graceful_shutdown();
                                conn.as_mut().await
                            }
                        };
                        if let Err(err) = result {
                            debug!(%remote_addr, error = ?err, "connection closed with error");
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = &mut signal => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        drop(listener);
        closing_tx.send_replace(true);
        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        if tokio::time::timeout(config.shutdown_timeout, drain).await.is_err() {
            warn!(
                remaining = active.load(Ordering::Relaxed),
                "shutdown timeout elapsed with connections still open"
            );
        }
        info!("Server closed");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Read a whole body, failing with `PayloadTooLarge` past `limit`
async fn collect_body(body: Incoming, declared: Option<usize>, limit: usize) -> Result<Bytes> {
    if let Some(len) = declared {
        if len > limit {
            return Err(Error::PayloadTooLarge { limit, actual: len });
        }
    }

    let bytes = body.collect().await?.to_bytes();
    if bytes.len() > limit {
        return Err(Error::PayloadTooLarge {
            limit,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

async fn handle_request(
    req: Request<Incoming>,
    app: &App,
    remote_addr: SocketAddr,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let limit = app.config().max_body_size;
    let (parts, body) = req.into_parts();
    let declared = parts
        .headers
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    let body = match collect_body(body, declared, limit).await {
        Ok(body) => body,
        Err(Error::PayloadTooLarge { limit, actual }) => {
            warn!(%remote_addr, limit, actual, "request body too large");
            return Ok(payload_too_large().into_hyper());
        }
        Err(err) => {
            error!(%remote_addr, error = %err, "Failed to read request");
            let mut response = Response::new(Full::new(Bytes::from("Bad Request")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let target = parts
        .uri
        .path_and_query()
        .map_or_else(|| "/".to_string(), ToString::to_string);
    let ctx = Context::builder(parts.method.as_str(), target)
        .headers(parts.headers)
        .body(body)
        .remote_addr(remote_addr)
        .body_limit(limit)
        .build();

    Ok(app.handle(ctx).await.into_hyper())
}
