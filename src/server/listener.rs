use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{Instrument, Span, error, info, info_span, warn};

use crate::config::Config;
use crate::handler::Handler;
use crate::http::connection::{Connection, ConnectionContext};

/// A running listener. Dropping it stops accepting connections.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Closes the listener, stops the event loop and waits for the worker
    /// thread. Connections still in flight are abandoned.
    pub fn shutdown(mut self) {
        self.signal();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("http input worker panicked");
            }
        }
    }

    fn signal(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            // The loop may already be gone; nothing to tell it then
            let _ = tx.send(());
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.signal();
    }
}

/// Binds the configured address and serves it from a dedicated worker
/// thread running a single-threaded event loop.
pub fn start(cfg: &Config, handler: Arc<dyn Handler>) -> anyhow::Result<ServerHandle> {
    let addr = cfg.listen_addr();
    let listener = std::net::TcpListener::bind(&addr)
        .with_context(|| format!("failed to bind {addr}"))?;
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;

    let ctx = ConnectionContext {
        body_size_limit: cfg.body_size_limit,
        idle_timeout: cfg.idle_timeout,
        handler,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build event loop")?;

    let (tx, rx) = oneshot::channel();
    let span = info_span!("http_input", addr = %local_addr);

    let worker = thread::Builder::new()
        .name("http-input".to_string())
        .spawn(move || {
            runtime.block_on(
                async move {
                    match TcpListener::from_std(listener) {
                        Ok(listener) => serve(listener, ctx, rx).await,
                        Err(e) => error!(error = %e, "failed to register listener"),
                    }
                }
                .instrument(span),
            );
        })
        .context("failed to spawn http input worker")?;

    Ok(ServerHandle {
        local_addr,
        shutdown: Some(tx),
        worker: Some(worker),
    })
}

/// Accept loop. Every connection becomes its own task on the current
/// runtime; the loop returns once `shutdown` fires or its sender is dropped.
pub async fn serve(
    listener: TcpListener,
    ctx: ConnectionContext,
    mut shutdown: oneshot::Receiver<()>,
) {
    info!(body_size_limit = ctx.body_size_limit, "listening");

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutting down http input");
                break;
            }

            res = listener.accept() => {
                let (socket, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        continue;
                    }
                };

                let conn_span = info_span!(parent: Span::current(), "connection", %peer);
                let conn = Connection::new(socket, ctx.clone());

                tokio::spawn(
                    async move {
                        if let Err(e) = conn.run().await {
                            warn!(error = %e, "connection error");
                        }
                    }
                    .instrument(conn_span),
                );
            }
        }
    }
}
